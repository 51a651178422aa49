//! # Dashboard API
//!
//! HTTP and WebSocket surface of the monitor process.
//!
//! ## Endpoints
//!
//! - `GET /health` - Process and backend connection summary
//! - `GET /api/status` - Current pipeline snapshot
//! - `POST /api/detection/start` - Start detecting (409 if not ready)
//! - `POST /api/detection/stop` - Stop detecting
//! - `GET /api/history` / `DELETE /api/history` - Detection history
//! - `GET /api/settings` / `PUT /api/settings` - User settings
//! - `GET /ws` - Live pipeline updates
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Example
//!
//! ```no_run
//! use ppe_monitor::api::{create_router, AppState};
//! use ppe_monitor::config::MonitorConfig;
//! use ppe_monitor::connection::ConnectionHandle;
//! use ppe_monitor::pipeline::PipelineHandle;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     pipeline: PipelineHandle,
//! #     connection: ConnectionHandle,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(MonitorConfig::default());
//! let state = Arc::new(AppState::new(pipeline, connection, config));
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

mod detection;
mod health;
pub mod types;

pub use types::*;

use crate::config::MonitorConfig;
use crate::connection::ConnectionHandle;
use crate::metrics::PrometheusHandle;
use crate::pipeline::PipelineHandle;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub pipeline: PipelineHandle,
    pub connection: ConnectionHandle,
    pub config: Arc<MonitorConfig>,
    /// Server startup time for uptime tracking
    pub start_time: Instant,
    /// Prometheus handle for rendering metrics
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(
        pipeline: PipelineHandle,
        connection: ConnectionHandle,
        config: Arc<MonitorConfig>,
    ) -> Self {
        Self {
            pipeline,
            connection,
            config,
            start_time: Instant::now(),
            prometheus: crate::metrics::prometheus_handle(),
        }
    }

    /// Render metrics from this handle instead of installing a recorder.
    pub fn with_prometheus(mut self, prometheus: PrometheusHandle) -> Self {
        self.prometheus = prometheus;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Create the router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let timeout = state.config.server.request_timeout();
    let max_body = state.config.server.max_body_bytes();

    let api = Router::new()
        .route("/health", get(health::handle))
        .route("/api/status", get(detection::status))
        .route("/api/detection/start", post(detection::start))
        .route("/api/detection/stop", post(detection::stop))
        .route(
            "/api/history",
            get(crate::dashboard::history_handler).delete(crate::dashboard::clear_history_handler),
        )
        .route(
            "/api/settings",
            get(crate::dashboard::settings_handler).put(crate::dashboard::update_settings_handler),
        )
        .route("/metrics", get(crate::metrics::handler::metrics_handler))
        .layer(TimeoutLayer::new(timeout));

    // The WebSocket route is long-lived and stays outside the timeout.
    Router::new()
        .route("/ws", get(crate::dashboard::websocket_handler))
        .merge(api)
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

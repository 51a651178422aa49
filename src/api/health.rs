//! Health check endpoint handler.

use crate::api::AppState;
use crate::connection::ConnectionState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub backend: BackendHealth,
    pub detection_active: bool,
}

/// Detection backend connection summary.
#[derive(Debug, Serialize)]
pub struct BackendHealth {
    pub url: String,
    pub state: ConnectionState,
}

/// GET /health - Return process health.
///
/// `healthy` with an open backend session, `degraded` otherwise; a stopped
/// pipeline is `unhealthy`.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let connection = state.connection.state();
    let snapshot = state.pipeline.snapshot().await.ok();

    let status = match (&snapshot, connection) {
        (None, _) => "unhealthy",
        (Some(_), ConnectionState::Connected) => "healthy",
        (Some(_), _) => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        uptime_seconds: state.uptime_seconds(),
        backend: BackendHealth {
            url: state.config.backend.url.clone(),
            state: connection,
        },
        detection_active: snapshot.map(|s| s.active).unwrap_or(false),
    })
}

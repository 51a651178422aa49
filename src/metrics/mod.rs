//! # Metrics Module
//!
//! Prometheus export for the detection pipeline, served at `GET /metrics`.
//!
//! ## Metrics Tracked
//!
//! **Counters:**
//! - `ppe_detection_requests_total` - Frames sent for detection
//! - `ppe_detection_skipped_total{reason}` - Loop steps that sent nothing
//!   (`disconnected`, `in_flight`, `no_frame`, `send_failed`)
//! - `ppe_compliance_records_total{outcome}` - History records by outcome
//! - `ppe_alerts_total` - Alerts fired
//! - `ppe_reconnects_total` - Reconnects scheduled
//!
//! **Histograms:**
//! - `ppe_detection_latency_seconds` - Request/response round trip
//!
//! **Gauges:**
//! - `ppe_adaptive_interval_ms` - Current loop interval
//! - `ppe_connection_up` - 1 while the backend session is open

pub mod handler;

pub use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Round-trip latency buckets in seconds.
const LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.2, 0.3, 0.45, 0.6, 0.8, 1.0, 1.5, 2.5, 5.0, 10.0];

/// Install the global Prometheus recorder.
///
/// Returns a PrometheusHandle that can be used to render metrics.
pub fn setup_metrics() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::Matcher;

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("ppe_detection_latency_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install_recorder()?;

    Ok(handle)
}

/// Handle for rendering, installing the recorder if nobody has yet.
///
/// When a recorder is already installed (tests, repeated startup), a
/// detached handle is returned instead.
pub fn prometheus_handle() -> PrometheusHandle {
    setup_metrics().unwrap_or_else(|e| {
        tracing::debug!("Metrics already initialized, creating new handle: {}", e);
        PrometheusBuilder::new().build_recorder().handle()
    })
}

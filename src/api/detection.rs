//! Detection control endpoints.

use crate::api::{Ack, ApiError, AppState};
use crate::pipeline::PipelineSnapshot;
use axum::{extract::State, Json};
use std::sync::Arc;

/// GET /api/status
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PipelineSnapshot>, ApiError> {
    Ok(Json(state.pipeline.snapshot().await?))
}

/// POST /api/detection/start
pub async fn start(State(state): State<Arc<AppState>>) -> Result<Json<Ack>, ApiError> {
    state.pipeline.start().await?;
    Ok(Json(Ack::ok("Detection started")))
}

/// POST /api/detection/stop
pub async fn stop(State(state): State<Arc<AppState>>) -> Result<Json<Ack>, ApiError> {
    state.pipeline.stop().await?;
    Ok(Json(Ack::ok("Detection stopped")))
}

//! HTTP handlers for history and settings routes

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::api::{Ack, ApiError, AppState};
use crate::history::DetectionHistoryRecord;
use crate::settings::UserSettings;

/// GET /api/history - records, newest first
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DetectionHistoryRecord>>, ApiError> {
    Ok(Json(state.pipeline.history().await?))
}

/// DELETE /api/history - delete every record
pub async fn clear_history_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Ack>, ApiError> {
    state.pipeline.clear_history().await?;
    Ok(Json(Ack::ok("History cleared")))
}

/// GET /api/settings
pub async fn settings_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserSettings>, ApiError> {
    Ok(Json(state.pipeline.settings().await?))
}

/// PUT /api/settings - merge a partial settings object and apply it
pub async fn update_settings_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<UserSettings>, ApiError> {
    let Json(patch) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if !patch.is_object() {
        return Err(ApiError::bad_request("Settings must be a JSON object"));
    }
    Ok(Json(state.pipeline.update_settings(patch).await?))
}

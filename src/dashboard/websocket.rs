//! WebSocket handler for live pipeline updates

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::pipeline::PipelineUpdate;

/// Largest update forwarded to a client.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Handles WebSocket upgrade requests for live updates
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize an update, or `None` if it cannot be sent.
pub fn encode_update(update: &PipelineUpdate) -> Option<String> {
    match serde_json::to_string(update) {
        Ok(json) if json.len() > MAX_MESSAGE_BYTES => {
            // Skip rather than truncate to avoid malformed JSON
            tracing::warn!(
                bytes = json.len(),
                limit = MAX_MESSAGE_BYTES,
                "WebSocket update too large, skipped"
            );
            None
        }
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to serialize WebSocket update: {}", e);
            None
        }
    }
}

/// Handles an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the initial snapshot so nothing is missed in between
    let mut rx = state.pipeline.subscribe();

    if let Ok(snapshot) = state.pipeline.snapshot().await {
        if let Some(json) = encode_update(&PipelineUpdate::Status(Box::new(snapshot))) {
            if sender.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
    }

    let send_task = tokio::spawn(async move {
        loop {
            let update = match rx.recv().await {
                Ok(update) => update,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Dashboard client lagging, updates dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(json) = encode_update(&update) else {
                continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages (ping/pong, close)
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }
}

//! Error types for the backend connection.

use thiserror::Error;

/// Errors surfaced by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// No open connection; the request was not queued
    #[error("not connected to the detection server")]
    NotConnected,

    /// The manager task has stopped
    #[error("connection manager is not running")]
    ManagerStopped,

    /// Connect attempt exceeded the configured timeout
    #[error("connection attempt timed out after {0}s")]
    Timeout(u64),

    /// WebSocket transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Outgoing message could not be encoded
    #[error("failed to encode message: {0}")]
    Encode(String),
}

//! Error types for frame capture.

use thiserror::Error;

/// Errors that can occur while producing a frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Source misconfigured
    #[error("invalid capture source: {0}")]
    InvalidSource(String),

    /// Source could not be reached or read
    #[error("capture source unavailable: {0}")]
    Unavailable(String),

    /// Grab exceeded the configured timeout
    #[error("capture timed out after {0}s")]
    Timeout(u64),

    /// Bytes were not a decodable image
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// JPEG encoding failed
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// Payload stayed above the hard limit at the smallest size
    #[error("encoded frame is {bytes} bytes, above the {limit} byte limit")]
    TooLarge { bytes: usize, limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

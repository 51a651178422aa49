//! Capture source adapter.
//!
//! Produces one size-bounded, JPEG-encoded frame per call from the configured
//! camera. A missing frame is not an error for the detection loop: the cycle
//! is skipped and the failure is only logged.

mod config;
mod encoder;
mod error;
mod source;

pub use config::{CameraConfig, CameraType, Resolution};
pub use encoder::{EncodedFrame, FrameEncoder, FrameLimits, SizeAdvisory};
pub use error::CaptureError;
pub use source::{source_for, FfmpegSource, FrameSource, SnapshotSource, StillSource};

/// Frame source plus encoder.
pub struct CaptureAdapter {
    source: Box<dyn FrameSource>,
    encoder: FrameEncoder,
    advisory: Option<SizeAdvisory>,
}

impl CaptureAdapter {
    pub fn new(source: Box<dyn FrameSource>, encoder: FrameEncoder) -> Self {
        Self {
            source,
            encoder,
            advisory: None,
        }
    }

    /// Adapter for a camera configuration with default frame limits.
    pub fn from_config(config: &CameraConfig) -> Result<Self, CaptureError> {
        Ok(Self::new(source_for(config)?, FrameEncoder::default()))
    }

    pub fn source_name(&self) -> String {
        self.source.name()
    }

    /// Whether the source can currently produce frames.
    pub async fn readiness(&self) -> Result<(), CaptureError> {
        self.source.check_ready().await
    }

    /// Capture and encode one frame, or `None` when no frame is available.
    pub async fn capture_frame(&mut self) -> Option<EncodedFrame> {
        let image = match self.source.grab().await {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!(source = %self.source.name(), error = %e, "No frame available");
                return None;
            }
        };

        let encoder = self.encoder.clone();
        let encoded = tokio::task::spawn_blocking(move || encoder.encode(&image)).await;
        match encoded {
            Ok(Ok(frame)) => {
                if let Some(advisory) = &frame.advisory {
                    tracing::warn!(advisory = %advisory.message(), "Frame size advisory");
                }
                self.advisory = frame.advisory.clone();
                Some(frame)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Frame could not be encoded, skipping cycle");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Frame encoder task failed");
                None
            }
        }
    }

    /// Advisory from the most recent frame, if it needed extra shrinking.
    pub fn advisory(&self) -> Option<&SizeAdvisory> {
        self.advisory.as_ref()
    }
}

impl std::fmt::Debug for CaptureAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureAdapter")
            .field("source", &self.source.name())
            .field("advisory", &self.advisory)
            .finish()
    }
}

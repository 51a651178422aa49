//! Frame sources.
//!
//! A [`FrameSource`] yields one decoded still image per call. Sources never
//! retain frames between calls.

use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{CameraConfig, CameraType, CaptureError};

/// Largest JPEG accepted from a network source.
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

/// Produces decoded still frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Human-readable source description for logs and status.
    fn name(&self) -> String;

    /// Whether the source can currently produce frames.
    async fn check_ready(&self) -> Result<(), CaptureError>;

    /// Grab and decode one frame.
    async fn grab(&self) -> Result<DynamicImage, CaptureError>;
}

/// Build the source described by a camera configuration.
pub fn source_for(config: &CameraConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
    config.validate()?;
    let timeout = Duration::from_secs(config.timeout_seconds);
    match config.camera_type {
        CameraType::Webcam => Ok(Box::new(FfmpegSource::device(
            &config.ffmpeg,
            &config.device,
            config.resolution.dimensions(),
            timeout,
        ))),
        CameraType::Ip => {
            let url = config.stream_url()?;
            if url.starts_with("rtsp://") {
                Ok(Box::new(FfmpegSource::rtsp(&config.ffmpeg, &url, timeout)))
            } else {
                Ok(Box::new(SnapshotSource::new(url, timeout)?))
            }
        }
        CameraType::File => {
            let path = config.file_path.clone().ok_or_else(|| {
                CaptureError::InvalidSource("file source requires filePath".to_string())
            })?;
            Ok(Box::new(StillSource::new(path)))
        }
    }
}

// ============================================================================
// HTTP snapshot / MJPEG
// ============================================================================

/// IP camera served over HTTP, either as a single JPEG per request or as a
/// multipart MJPEG stream (the first complete frame is taken).
pub struct SnapshotSource {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl SnapshotSource {
    pub fn new(url: String, timeout: Duration) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| CaptureError::InvalidSource(e.to_string()))?;
        Ok(Self {
            url,
            client,
            timeout,
        })
    }

    async fn fetch_jpeg(&self) -> Result<Vec<u8>, CaptureError> {
        let mut response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptureError::Unavailable(format!(
                "camera returned HTTP {}",
                response.status()
            )));
        }

        let multipart = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_lowercase().contains("multipart"))
            .unwrap_or(false);

        let mut buffer: Vec<u8> = Vec::with_capacity(64 * 1024);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?
        {
            buffer.extend_from_slice(&chunk);
            if multipart {
                if let Some((start, end)) = find_jpeg_bounds(&buffer) {
                    return Ok(buffer[start..end].to_vec());
                }
            }
            if buffer.len() > MAX_JPEG_BYTES {
                return Err(CaptureError::Decode(format!(
                    "camera frame exceeded {} bytes",
                    MAX_JPEG_BYTES
                )));
            }
        }

        if multipart {
            return Err(CaptureError::Unavailable(
                "mjpeg stream ended before a complete frame".to_string(),
            ));
        }
        if buffer.is_empty() {
            return Err(CaptureError::Unavailable("empty snapshot".to_string()));
        }
        Ok(buffer)
    }
}

#[async_trait]
impl FrameSource for SnapshotSource {
    fn name(&self) -> String {
        format!("ip:{}", self.url)
    }

    async fn check_ready(&self) -> Result<(), CaptureError> {
        self.grab().await.map(|_| ())
    }

    async fn grab(&self) -> Result<DynamicImage, CaptureError> {
        let bytes = tokio::time::timeout(self.timeout, self.fetch_jpeg())
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout.as_secs()))??;
        decode(bytes).await
    }
}

/// Locate the first complete JPEG (SOI..EOI) in a buffer.
pub(crate) fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

// ============================================================================
// ffmpeg (local device / RTSP)
// ============================================================================

/// One-shot ffmpeg capture from a V4L2 device or an RTSP stream.
pub struct FfmpegSource {
    program: String,
    input: String,
    input_args: Vec<String>,
    timeout: Duration,
    device: Option<PathBuf>,
}

impl FfmpegSource {
    pub fn device(program: &str, device: &str, size: (u32, u32), timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            input: device.to_string(),
            input_args: vec![
                "-f".to_string(),
                "v4l2".to_string(),
                "-video_size".to_string(),
                format!("{}x{}", size.0, size.1),
            ],
            timeout,
            device: Some(PathBuf::from(device)),
        }
    }

    pub fn rtsp(program: &str, url: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            input: url.to_string(),
            input_args: vec!["-rtsp_transport".to_string(), "tcp".to_string()],
            timeout,
            device: None,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = self.input_args.clone();
        args.extend(
            [
                "-i",
                self.input.as_str(),
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-loglevel",
                "error",
                "-",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

#[async_trait]
impl FrameSource for FfmpegSource {
    fn name(&self) -> String {
        match &self.device {
            Some(device) => format!("webcam:{}", device.display()),
            None => format!("rtsp:{}", self.input),
        }
    }

    async fn check_ready(&self) -> Result<(), CaptureError> {
        match &self.device {
            Some(device) if !device.exists() => Err(CaptureError::Unavailable(format!(
                "video device {} not found",
                device.display()
            ))),
            Some(_) => Ok(()),
            None => self.grab().await.map(|_| ()),
        }
    }

    async fn grab(&self) -> Result<DynamicImage, CaptureError> {
        let child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Unavailable(format!("ffmpeg spawn failed: {}", e)))?;

        // Dropping the child on timeout kills ffmpeg
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    source = %self.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "ffmpeg timeout, process killed"
                );
                return Err(CaptureError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CaptureError::Unavailable(format!(
                "ffmpeg failed: {}",
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(CaptureError::Unavailable(
                "ffmpeg returned empty output".to_string(),
            ));
        }

        decode(output.stdout).await
    }
}

// ============================================================================
// Still image file
// ============================================================================

/// Image file on disk, re-read on every grab so it can be swapped live.
pub struct StillSource {
    path: PathBuf,
}

impl StillSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl FrameSource for StillSource {
    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn check_ready(&self) -> Result<(), CaptureError> {
        if tokio::fs::metadata(&self.path).await.is_err() {
            return Err(CaptureError::Unavailable(format!(
                "{} not found",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn grab(&self) -> Result<DynamicImage, CaptureError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| CaptureError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        decode(bytes).await
    }
}

async fn decode(bytes: Vec<u8>) -> Result<DynamicImage, CaptureError> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| CaptureError::Decode(e.to_string()))?
        .map_err(|e| CaptureError::Decode(e.to_string()))
}

//! Camera source configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use super::CaptureError;

/// Kind of capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraType {
    /// Local video device, read through ffmpeg
    #[default]
    Webcam,
    /// Network camera (HTTP snapshot/MJPEG or RTSP)
    Ip,
    /// Still image on disk, re-read on every capture
    File,
}

/// Requested webcam resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl Resolution {
    /// Width and height in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::P1080 => (1920, 1080),
            Resolution::P720 => (1280, 720),
            Resolution::P480 => (854, 480),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1080p" => Ok(Resolution::P1080),
            "720p" => Ok(Resolution::P720),
            "480p" => Ok(Resolution::P480),
            _ => Err(format!("Invalid resolution: {}", s)),
        }
    }
}

/// Where frames come from.
///
/// Keys are camelCase so the same object can live in the user settings
/// file; snake_case aliases are accepted in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    #[serde(rename = "type")]
    pub camera_type: CameraType,
    /// Video device for `webcam` sources
    pub device: String,
    /// Camera URL for `ip` sources (http, https or rtsp)
    #[serde(rename = "ipUrl", alias = "ip_url")]
    pub ip_url: String,
    /// Image path for `file` sources
    #[serde(
        rename = "filePath",
        alias = "file_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_path: Option<PathBuf>,
    pub resolution: Resolution,
    /// ffmpeg binary used for device and RTSP capture
    pub ffmpeg: String,
    /// Upper bound on a single frame grab
    #[serde(rename = "timeoutSeconds", alias = "timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_type: CameraType::Webcam,
            device: "/dev/video0".to_string(),
            ip_url: String::new(),
            file_path: None,
            resolution: Resolution::P1080,
            ffmpeg: "ffmpeg".to_string(),
            timeout_seconds: 5,
        }
    }
}

impl CameraConfig {
    /// Effective stream URL for an IP camera.
    ///
    /// Only `http`, `https` and `rtsp` are accepted. HTTP URLs whose path
    /// has no `/video`, `/stream` or `/mjpeg` segment get `/video` appended.
    pub fn stream_url(&self) -> Result<String, CaptureError> {
        let raw = self.ip_url.trim();
        if raw.is_empty() {
            return Err(CaptureError::InvalidSource(
                "IP camera URL is not configured".to_string(),
            ));
        }

        let url = reqwest::Url::parse(raw)
            .map_err(|e| CaptureError::InvalidSource(format!("invalid camera URL '{}': {}", raw, e)))?;

        match url.scheme() {
            "rtsp" => Ok(raw.to_string()),
            "http" | "https" => {
                let path = url.path();
                if ["/video", "/stream", "/mjpeg"]
                    .iter()
                    .any(|segment| path.contains(segment))
                {
                    Ok(raw.to_string())
                } else if raw.ends_with('/') {
                    Ok(format!("{}video", raw))
                } else {
                    Ok(format!("{}/video", raw))
                }
            }
            other => Err(CaptureError::InvalidSource(format!(
                "unsupported camera scheme '{}'; use http://, https:// or rtsp://",
                other
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        match self.camera_type {
            CameraType::Webcam => {
                if self.device.trim().is_empty() {
                    return Err(CaptureError::InvalidSource(
                        "webcam device is not configured".to_string(),
                    ));
                }
            }
            CameraType::Ip => {
                self.stream_url()?;
            }
            CameraType::File => {
                if self.file_path.is_none() {
                    return Err(CaptureError::InvalidSource(
                        "file source requires filePath".to_string(),
                    ));
                }
            }
        }
        if self.timeout_seconds == 0 {
            return Err(CaptureError::InvalidSource(
                "capture timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

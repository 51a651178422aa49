//! Configuration module for the PPE monitor
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`PPE_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! User settings edited at runtime (`epp-config.json`, see [`crate::settings`])
//! are layered on top of the `camera`, `required_ppe`, `alerts` and `history`
//! sections once the monitor is running.
//!
//! # Example
//!
//! ```rust
//! use ppe_monitor::config::MonitorConfig;
//!
//! // Load defaults
//! let config = MonitorConfig::default();
//! assert_eq!(config.server.port, 8080);
//!
//! // Parse from TOML
//! let toml = r#"
//! [backend]
//! url = "http://192.168.1.20:8000"
//! "#;
//! let config: MonitorConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.backend.url, "http://192.168.1.20:8000");
//! ```

pub mod backend;
pub mod error;
pub mod logging;
pub mod server;
pub mod storage;

pub use backend::BackendConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;
pub use storage::StorageConfig;

// Sections owned by the components they configure
pub use crate::alert::{AlertKind, AlertSettings};
pub use crate::capture::{CameraConfig, CameraType, Resolution};
pub use crate::history::HistorySettings;
pub use crate::scheduler::SchedulerConfig;

use crate::ppe::RequiredPpe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unified configuration for the monitor process.
///
/// # Example
///
/// ```rust
/// use ppe_monitor::config::MonitorConfig;
///
/// let config = MonitorConfig::default();
/// assert_eq!(config.server.host, "0.0.0.0");
/// assert_eq!(config.history.max_records, 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Dashboard HTTP server
    pub server: ServerConfig,
    /// Detection backend connection
    pub backend: BackendConfig,
    /// Default capture source
    pub camera: CameraConfig,
    /// Detection loop pacing
    pub detection: SchedulerConfig,
    /// Persisted state location
    pub storage: StorageConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// PPE kinds that participate in compliance; unlisted kinds are not required
    pub required_ppe: RequiredPpe,
    /// Default alert behaviour
    pub alerts: AlertSettings,
    /// Default history retention
    pub history: HistorySettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            camera: CameraConfig::default(),
            detection: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            required_ppe: RequiredPpe::all(),
            alerts: AlertSettings::default(),
            history: HistorySettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports PPE_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        // Server settings
        if let Ok(port) = std::env::var("PPE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("PPE_HOST") {
            self.server.host = host;
        }

        // Backend and storage
        if let Ok(url) = std::env::var("PPE_BACKEND_URL") {
            if !url.is_empty() {
                self.backend.url = url;
            }
        }
        if let Ok(dir) = std::env::var("PPE_DATA_DIR") {
            if !dir.is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }

        // Logging settings
        if let Ok(level) = std::env::var("PPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("PPE_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.server.max_body_kib == 0 {
            return Err(ConfigError::invalid(
                "server.max_body_kib",
                "request body limit must be non-zero",
            ));
        }
        if let Some((field, level)) = self.logging.invalid_level() {
            return Err(ConfigError::invalid(
                format!("logging.{}", field),
                format!("unknown log level '{}'", level),
            ));
        }

        self.backend.validate()?;
        self.camera
            .validate()
            .map_err(|e| ConfigError::invalid("camera", e.to_string()))?;

        let detection = &self.detection;
        if !(0.0..=1.0).contains(&detection.confidence) {
            return Err(ConfigError::invalid(
                "detection.confidence",
                "confidence must be between 0 and 1",
            ));
        }
        if detection.min_samples == 0 || detection.latency_window < detection.min_samples {
            return Err(ConfigError::invalid(
                "detection.min_samples",
                "min_samples must be at least 1 and no larger than latency_window",
            ));
        }
        if detection.fast_latency_ms >= detection.slow_latency_ms {
            return Err(ConfigError::invalid(
                "detection.fast_latency_ms",
                "fast latency threshold must be below the slow threshold",
            ));
        }
        if detection.default_interval_ms == 0
            || detection.fast_interval_ms == 0
            || detection.normal_interval_ms == 0
            || detection.slow_interval_ms == 0
        {
            return Err(ConfigError::invalid(
                "detection",
                "detection intervals must be non-zero",
            ));
        }

        if self.alerts.volume > 100 {
            return Err(ConfigError::invalid(
                "alerts.volume",
                "volume must be between 0 and 100",
            ));
        }
        if self.history.max_records == 0 {
            return Err(ConfigError::invalid(
                "history.max_records",
                "at least one record must be retained",
            ));
        }

        Ok(())
    }
}

//! Detection backend connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ConfigError;

/// How to reach and keep a connection to the detection backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend (http, https, ws or wss)
    pub url: String,
    /// Path of the detection WebSocket endpoint
    pub ws_path: String,
    /// Connect automatically on startup
    pub auto_connect: bool,
    /// Upper bound on a single connection attempt
    pub connect_timeout_seconds: u64,
    /// Seconds between client heartbeat pings
    pub heartbeat_interval_seconds: u64,
    /// Reconnect delay per consecutive failure; the last step repeats
    pub reconnect_delays_ms: Vec<u64>,
    /// Seconds a connection must stay open before the backoff resets
    pub stable_connection_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            ws_path: "/api/ws/detect".to_string(),
            auto_connect: true,
            connect_timeout_seconds: 10,
            heartbeat_interval_seconds: 30,
            reconnect_delays_ms: vec![2000, 5000, 10000, 30000],
            stable_connection_seconds: 300,
        }
    }
}

impl BackendConfig {
    /// WebSocket endpoint derived from the base URL (`http` becomes `ws`).
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        let base = self.url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else if base.starts_with("ws://") || base.starts_with("wss://") {
            base.to_string()
        } else {
            return Err(ConfigError::invalid(
                "backend.url",
                format!("unsupported scheme in '{}'; expected http(s) or ws(s)", self.url),
            ));
        };

        let path = if self.ws_path.starts_with('/') {
            self.ws_path.clone()
        } else {
            format!("/{}", self.ws_path)
        };

        Ok(format!("{}{}", ws_base, path))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn stable_window(&self) -> Duration {
        Duration::from_secs(self.stable_connection_seconds)
    }

    pub fn reconnect_delays(&self) -> Vec<Duration> {
        self.reconnect_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;
        if self.reconnect_delays_ms.is_empty() {
            return Err(ConfigError::invalid(
                "backend.reconnect_delays_ms",
                "at least one reconnect delay is required",
            ));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::invalid(
                "backend.heartbeat_interval_seconds",
                "heartbeat interval must be non-zero",
            ));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "backend.connect_timeout_seconds",
                "connect timeout must be non-zero",
            ));
        }
        Ok(())
    }
}

//! Dashboard surface settings (`[server]`)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the status/history/settings API and the `/ws` update stream are
/// served. With `enabled = false` the monitor runs headless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Applies to the JSON routes only; `/ws` sessions are long-lived.
    pub request_timeout_seconds: u64,
    /// Largest accepted request body, in KiB (a settings object is a few hundred bytes)
    pub max_body_kib: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 30,
            max_body_kib: 256,
        }
    }
}

impl ServerConfig {
    /// `host:port` for the dashboard listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_kib.saturating_mul(1024)
    }
}

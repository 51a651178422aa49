//! Log output settings (`[logging]`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line output for a terminal
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Monitor logging.
///
/// `component_levels` keys are module names under `ppe_monitor`
/// (`connection`, `scheduler`, `capture`, `pipeline`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_levels: Option<HashMap<String, String>>,
    /// Log size and a prefix of every outgoing frame at debug level
    pub log_payloads: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            component_levels: None,
            log_payloads: false,
        }
    }
}

impl LoggingConfig {
    /// Check `level` and every component level. Returns the offending key
    /// and value on failure.
    pub fn invalid_level(&self) -> Option<(String, String)> {
        if !is_level(&self.level) {
            return Some(("level".to_string(), self.level.clone()));
        }
        let components = self.component_levels.as_ref()?;
        let mut names: Vec<_> = components.keys().collect();
        names.sort();
        names.into_iter().find_map(|name| {
            let level = &components[name];
            (!is_level(level)).then(|| (format!("component_levels.{}", name), level.clone()))
        })
    }
}

fn is_level(value: &str) -> bool {
    LEVELS.contains(&value.to_lowercase().as_str())
}

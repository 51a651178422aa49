//! Configuration for detection scheduling.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pacing parameters for the adaptive detection loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval used until enough latency samples exist, and after stop
    pub default_interval_ms: u64,
    /// Confidence threshold sent with every request
    pub confidence: f32,
    /// Latency samples retained (FIFO)
    pub latency_window: usize,
    /// Samples required before the interval adapts
    pub min_samples: usize,
    /// Mean latency below this selects `fast_interval_ms`
    pub fast_latency_ms: u64,
    /// Mean latency below this (and at or above `fast_latency_ms`) selects `normal_interval_ms`
    pub slow_latency_ms: u64,
    pub fast_interval_ms: u64,
    pub normal_interval_ms: u64,
    pub slow_interval_ms: u64,
    /// An unanswered request older than this is considered lost
    pub in_flight_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 1500,
            confidence: 0.3,
            latency_window: 10,
            min_samples: 5,
            fast_latency_ms: 300,
            slow_latency_ms: 600,
            fast_interval_ms: 1000,
            normal_interval_ms: 1500,
            slow_interval_ms: 2500,
            in_flight_timeout_ms: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    pub fn in_flight_timeout(&self) -> Duration {
        Duration::from_millis(self.in_flight_timeout_ms)
    }

    /// Interval for a given mean round-trip latency.
    pub fn interval_for_mean(&self, mean_ms: f64) -> Duration {
        let ms = if mean_ms < self.fast_latency_ms as f64 {
            self.fast_interval_ms
        } else if mean_ms < self.slow_latency_ms as f64 {
            self.normal_interval_ms
        } else {
            self.slow_interval_ms
        };
        Duration::from_millis(ms)
    }
}

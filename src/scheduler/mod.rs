//! Adaptive detection scheduling.
//!
//! The [`Scheduler`] decides when the next frame is captured and sent. It
//! keeps at most one detection request in flight, and paces the loop from the
//! mean of recent round-trip latencies. It is a plain state machine: callers
//! pass the current instant in and act on the returned [`StepDecision`].

mod config;
mod latency;


pub use config::SchedulerConfig;
pub use latency::LatencyHistory;

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Why detection could not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("detection is already running")]
    AlreadyRunning,

    #[error("camera is not available: {0}")]
    CaptureNotReady(String),

    #[error("detection server is not connected")]
    BackendDisconnected,
}

/// Outcome of a loop step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Detection is stopped; nothing was re-armed.
    Inactive,
    /// The backend connection is down; the step was a no-op.
    Disconnected,
    /// A request is still in flight; this cycle is dropped.
    Busy,
    /// Capture a frame and send it.
    Capture,
}

/// Scheduling state for the detection loop.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    active: bool,
    /// When the outstanding request's step began
    in_flight_since: Option<Instant>,
    /// Requests sent before the last `stop` whose responses are still due
    orphaned: u32,
    interval: Duration,
    latency: LatencyHistory,
    next_step_at: Option<Instant>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let interval = config.default_interval();
        let latency = LatencyHistory::new(config.latency_window);
        Self {
            config,
            active: false,
            in_flight_since: None,
            orphaned: 0,
            interval,
            latency,
            next_step_at: None,
        }
    }

    /// Begin detecting. The first step is armed immediately.
    pub fn start(
        &mut self,
        now: Instant,
        capture: Result<(), String>,
        connected: bool,
    ) -> Result<(), StartError> {
        if self.active {
            return Err(StartError::AlreadyRunning);
        }
        capture.map_err(StartError::CaptureNotReady)?;
        if !connected {
            return Err(StartError::BackendDisconnected);
        }

        self.active = true;
        self.next_step_at = Some(now);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Detection started"
        );
        Ok(())
    }

    /// Stop detecting and reset pacing to defaults.
    pub fn stop(&mut self) {
        if self.active {
            tracing::info!("Detection stopped");
        }
        self.active = false;
        self.next_step_at = None;
        if self.in_flight_since.take().is_some() {
            self.orphaned += 1;
        }
        self.latency.clear();
        self.interval = self.config.default_interval();
    }

    /// Run one loop step.
    ///
    /// While active, the next step is re-armed one interval from `now`
    /// regardless of the decision.
    pub fn begin_step(&mut self, now: Instant, connected: bool) -> StepDecision {
        if !self.active {
            self.next_step_at = None;
            return StepDecision::Inactive;
        }

        self.next_step_at = Some(now + self.interval);

        if !connected {
            return StepDecision::Disconnected;
        }

        if let Some(since) = self.in_flight_since {
            if now.saturating_duration_since(since) < self.config.in_flight_timeout() {
                tracing::debug!("Previous detection still in flight, skipping cycle");
                return StepDecision::Busy;
            }
            tracing::warn!(
                waited_ms = now.saturating_duration_since(since).as_millis() as u64,
                "Detection response never arrived, discarding in-flight request"
            );
            self.orphaned = 0;
        }

        self.in_flight_since = Some(now);
        StepDecision::Capture
    }

    /// Drop the in-flight marker without ending a cycle (no frame captured,
    /// send failed, or the connection went away).
    pub fn cancel_in_flight(&mut self) {
        self.in_flight_since = None;
    }

    /// The session carrying outstanding requests ended; none of their
    /// responses will arrive.
    pub fn connection_lost(&mut self) {
        self.in_flight_since = None;
        self.orphaned = 0;
    }

    /// Responses arrive in send order, so the oldest outstanding request is
    /// the one being answered. Returns true when that was a request sent
    /// before the last `stop`.
    fn take_orphan(&mut self) -> bool {
        if self.orphaned == 0 {
            return false;
        }
        self.orphaned -= 1;
        tracing::debug!("Response to a request sent before stop");
        true
    }

    /// A detection result was reconciled.
    ///
    /// Records the round-trip latency, adapts the interval and re-arms the
    /// next step one interval from `now`. Returns the latency, or `None` when
    /// the response belongs to no current request (for example one sent
    /// before `stop`).
    pub fn complete(&mut self, now: Instant) -> Option<Duration> {
        if self.take_orphan() {
            return None;
        }
        let since = self.in_flight_since.take()?;
        let latency = now.saturating_duration_since(since);

        self.latency.push(latency);
        if self.latency.len() >= self.config.min_samples {
            if let Some(mean) = self.latency.mean_ms() {
                let interval = self.config.interval_for_mean(mean);
                if interval != self.interval {
                    tracing::debug!(
                        mean_latency_ms = mean,
                        old_interval_ms = self.interval.as_millis() as u64,
                        new_interval_ms = interval.as_millis() as u64,
                        "Adaptive interval changed"
                    );
                }
                self.interval = interval;
            }
        }

        self.rearm_after_cycle(now);
        Some(latency)
    }

    /// The cycle ended without a usable result (rejected payload or no
    /// subject in frame). No latency sample is recorded.
    pub fn abort(&mut self, now: Instant) {
        if self.take_orphan() {
            return;
        }
        if self.in_flight_since.take().is_some() {
            self.rearm_after_cycle(now);
        }
    }

    fn rearm_after_cycle(&mut self, now: Instant) {
        if self.active {
            self.next_step_at = Some(now + self.interval);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight_since.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_step_at
    }

    pub fn latency(&self) -> &LatencyHistory {
        &self.latency
    }

    pub fn confidence(&self) -> f32 {
        self.config.confidence
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

//! Stepped reconnect backoff.

use std::time::Duration;

const FALLBACK_DELAY: Duration = Duration::from_secs(2);

/// Discrete reconnect delay schedule.
///
/// Each consecutive failure advances one step; the last step repeats until
/// [`Backoff::reset`] is called.
#[derive(Debug, Clone)]
pub struct Backoff {
    delays: Vec<Duration>,
    index: usize,
    attempts: u32,
}

impl Backoff {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays,
            index: 0,
            attempts: 0,
        }
    }

    /// Delay before the next reconnect attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delays.get(self.index).copied().unwrap_or(FALLBACK_DELAY);
        if self.index + 1 < self.delays.len() {
            self.index += 1;
        }
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Return to the first step.
    pub fn reset(&mut self) {
        self.index = 0;
        self.attempts = 0;
    }

    /// Index of the step the next delay will come from.
    pub fn step(&self) -> usize {
        self.index
    }

    /// Reconnect attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

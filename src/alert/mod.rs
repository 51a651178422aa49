//! Rate-limited compliance alerts.
//!
//! [`AlertThrottle`] is an owned value: the reconciler holds one and calls
//! [`AlertThrottle::trigger`] on every non-compliant result and
//! [`AlertThrottle::reset`] whenever compliance is restored.

mod tone;

pub use tone::{Muted, TerminalBell, Tone, ToneSink};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// How an alert is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Banner only
    Visual,
    /// Tone only
    Sound,
    /// Banner and tone
    #[default]
    Both,
}

impl AlertKind {
    pub fn audible(self) -> bool {
        matches!(self, AlertKind::Sound | AlertKind::Both)
    }
}

/// Alert behaviour chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    #[serde(rename = "type", alias = "kind")]
    pub kind: AlertKind,
    /// 0-100
    pub volume: u8,
    /// Minimum seconds between two alerts
    #[serde(rename = "repeatInterval", alias = "repeat_interval")]
    pub repeat_interval: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            kind: AlertKind::Both,
            volume: 70,
            repeat_interval: 5,
        }
    }
}

impl AlertSettings {
    pub fn repeat_interval(&self) -> Duration {
        Duration::from_secs(self.repeat_interval)
    }
}

/// Rate limiter for alert side effects.
pub struct AlertThrottle {
    last_alert: Option<Instant>,
    last_tone: Option<Tone>,
    sink: Box<dyn ToneSink>,
}

impl AlertThrottle {
    pub fn new(sink: Box<dyn ToneSink>) -> Self {
        Self {
            last_alert: None,
            last_tone: None,
            sink,
        }
    }

    /// Fire an alert unless one fired less than `repeat_interval` ago.
    ///
    /// Audible kinds play a tone scaled to `volume`. Returns whether the
    /// alert fired.
    pub fn trigger(
        &mut self,
        now: Instant,
        kind: AlertKind,
        volume: u8,
        repeat_interval: Duration,
    ) -> bool {
        if let Some(last) = self.last_alert {
            if now.saturating_duration_since(last) < repeat_interval {
                return false;
            }
        }
        self.last_alert = Some(now);

        self.last_tone = kind.audible().then(|| Tone::alert(volume));
        if let Some(tone) = &self.last_tone {
            self.sink.play(tone);
        }
        true
    }

    /// Re-arm immediate alerting.
    pub fn reset(&mut self) {
        self.last_alert = None;
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    /// Tone of the most recent alert; `None` if it was visual only.
    pub fn last_tone(&self) -> Option<&Tone> {
        self.last_tone.as_ref()
    }
}

impl std::fmt::Debug for AlertThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertThrottle")
            .field("last_alert", &self.last_alert)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CountingSink(Arc<Mutex<Vec<Tone>>>);

    impl ToneSink for CountingSink {
        fn play(&self, tone: &Tone) {
            self.0.lock().unwrap().push(tone.clone());
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_first_trigger_fires() {
        let sink = CountingSink::default();
        let mut throttle = AlertThrottle::new(Box::new(sink.clone()));
        assert!(throttle.trigger(Instant::now(), AlertKind::Both, 70, secs(5)));
        assert_eq!(throttle.last_tone(), Some(&Tone::alert(70)));
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_trigger_within_interval_suppressed() {
        let sink = CountingSink::default();
        let mut throttle = AlertThrottle::new(Box::new(sink.clone()));
        let t0 = Instant::now();

        assert!(throttle.trigger(t0, AlertKind::Sound, 70, secs(5)));
        assert!(!throttle.trigger(t0 + secs(4), AlertKind::Sound, 70, secs(5)));
        assert!(throttle.trigger(t0 + secs(5), AlertKind::Sound, 70, secs(5)));
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_reset_rearms_immediately() {
        let mut throttle = AlertThrottle::new(Box::new(Muted));
        let t0 = Instant::now();

        assert!(throttle.trigger(t0, AlertKind::Both, 70, secs(5)));
        throttle.reset();
        assert!(throttle.last_alert().is_none());
        assert!(throttle.trigger(t0 + Duration::from_millis(10), AlertKind::Both, 70, secs(5)));
    }

    #[test]
    fn test_visual_alert_has_no_tone() {
        let sink = CountingSink::default();
        let mut throttle = AlertThrottle::new(Box::new(sink.clone()));
        assert!(throttle.trigger(Instant::now(), AlertKind::Visual, 70, secs(5)));
        assert!(throttle.last_tone().is_none());
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_visual_alert_still_throttles() {
        let mut throttle = AlertThrottle::new(Box::new(Muted));
        let t0 = Instant::now();
        assert!(throttle.trigger(t0, AlertKind::Visual, 70, secs(5)));
        assert!(!throttle.trigger(t0 + secs(1), AlertKind::Sound, 70, secs(5)));
    }

    #[test]
    fn test_settings_wire_keys() {
        let settings: AlertSettings =
            serde_json::from_str(r#"{"type":"sound","volume":40,"repeatInterval":10}"#).unwrap();
        assert_eq!(settings.kind, AlertKind::Sound);
        assert_eq!(settings.volume, 40);
        assert_eq!(settings.repeat_interval(), secs(10));

        let defaults: AlertSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, AlertSettings::default());
    }
}

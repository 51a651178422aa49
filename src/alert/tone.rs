//! Synthesized alert tone and its outputs.

use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// Short decaying sine beep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration_ms: u64,
    pub sample_rate: u32,
    /// Gain at the start of the tone
    pub gain: f32,
    /// Gain the envelope decays to by the end
    pub end_gain: f32,
}

impl Tone {
    pub const FREQUENCY_HZ: f32 = 800.0;
    pub const DURATION: Duration = Duration::from_millis(300);
    pub const SAMPLE_RATE: u32 = 44_100;
    pub const FLOOR_GAIN: f32 = 0.01;

    /// Alert beep scaled to a 0-100 volume.
    pub fn alert(volume: u8) -> Self {
        let gain = (f32::from(volume) / 100.0).clamp(Self::FLOOR_GAIN, 1.0);
        Self {
            frequency_hz: Self::FREQUENCY_HZ,
            duration_ms: Self::DURATION.as_millis() as u64,
            sample_rate: Self::SAMPLE_RATE,
            gain,
            end_gain: Self::FLOOR_GAIN,
        }
    }

    pub fn sample_count(&self) -> usize {
        (self.sample_rate as u64 * self.duration_ms / 1000) as usize
    }

    /// Gain at sample `n`, decaying exponentially from `gain` to `end_gain`.
    pub fn envelope(&self, n: usize) -> f32 {
        let total = self.sample_count().max(1) as f32;
        let t = (n as f32 / total).min(1.0);
        self.gain * (self.end_gain / self.gain).powf(t)
    }

    /// Mono PCM samples in [-1, 1].
    pub fn samples(&self) -> Vec<f32> {
        let rate = self.sample_rate as f32;
        (0..self.sample_count())
            .map(|n| {
                let phase = 2.0 * std::f32::consts::PI * self.frequency_hz * n as f32 / rate;
                phase.sin() * self.envelope(n)
            })
            .collect()
    }
}

/// Plays alert tones.
pub trait ToneSink: Send + Sync {
    fn play(&self, tone: &Tone);
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl ToneSink for TerminalBell {
    fn play(&self, tone: &Tone) {
        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            tracing::debug!(error = %e, "Terminal bell failed");
        }
        tracing::trace!(frequency_hz = tone.frequency_hz, gain = tone.gain, "Alert tone");
    }
}

/// Discards tones.
#[derive(Debug, Default, Clone, Copy)]
pub struct Muted;

impl ToneSink for Muted {
    fn play(&self, _tone: &Tone) {}
}

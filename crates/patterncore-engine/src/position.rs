use std::time::Duration;

use tokio::time::Instant;

/// `(step, beat, bar)` — step is authoritative; beat/bar are always derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Position {
    pub step: u16,
    pub beat: u16,
    pub bar: u16,
}

impl Position {
    pub fn from_step(step: u16) -> Self {
        Self {
            step,
            beat: step / 4,
            bar: step / 16,
        }
    }
}

/// Anchor-based scheduling: every target time is derived from a single
/// stored origin (`anchor` at `anchor_pulse`), never from accumulating
/// `sleep` calls. A BPM change or a pause/resume re-anchors — it
/// re-derives the interval and moves the origin to "now, at the current
/// pulse" — but never resets the pulse count itself.
///
/// `pulse` is an absolute, never-wrapping step count (`lap * 256 + step`),
/// not the 0..256 in-lap grid position — the anchor/delta arithmetic only
/// stays drift-free if the values it subtracts never wrap independently of
/// one another. Callers that need the in-lap step reduce `pulse % 256`
/// themselves.
#[derive(Debug, Clone, Copy)]
pub struct AnchorClock {
    anchor: Instant,
    anchor_pulse: u64,
    bpm: f64,
}

impl AnchorClock {
    pub fn new(now: Instant, bpm: f64) -> Self {
        Self {
            anchor: now,
            anchor_pulse: 0,
            bpm,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn step_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm / 4.0)
    }

    /// Target time for `pulse`, counted from the anchor — never by summing
    /// per-step sleeps, so drift never accumulates across laps.
    pub fn target_time(&self, pulse: u64) -> Instant {
        let delta = pulse as i64 - self.anchor_pulse as i64;
        let offset = self.step_duration().as_secs_f64() * delta as f64;
        if offset >= 0.0 {
            self.anchor + Duration::from_secs_f64(offset)
        } else {
            self.anchor - Duration::from_secs_f64(-offset)
        }
    }

    /// Target time for `pulse`, shifted by the swing applied to odd
    /// grid positions within the beat (`pulse mod 4` in `{1, 3}`).
    pub fn target_time_with_swing(&self, pulse: u64, swing: f64) -> Instant {
        let base = self.target_time(pulse);
        if swing > 0.0 && matches!(pulse % 4, 1 | 3) {
            let shift = self.step_duration().as_secs_f64() * swing / 2.0;
            base + Duration::from_secs_f64(shift)
        } else {
            base
        }
    }

    /// Re-anchors at `now`, preserving `current_pulse` as the new origin.
    /// Used on resume-from-pause (no BPM change), on BPM change (which also
    /// updates `bpm` first via [`Self::set_bpm`]), and whenever the engine
    /// needs `target_time` to stay accurate without restarting the pulse
    /// count from zero.
    pub fn reanchor(&mut self, now: Instant, current_pulse: u64) {
        self.anchor = now;
        self.anchor_pulse = current_pulse;
    }

    /// Recomputes the target interval without resetting the anchor's step
    /// origin; callers re-anchor separately (see [`Self::reanchor`]) so the
    /// current position is preserved exactly as spec'd: `t0' = now -
    /// current_step * new_step_duration`.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }
}

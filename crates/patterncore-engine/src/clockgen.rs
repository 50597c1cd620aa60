use std::time::Duration;

use tokio::time::Instant;

/// 24-PPQ MIDI clock pulse timing, locked to the same anchor the step
/// cursor uses. `next_due` always recomputes the pulse index from the
/// anchor rather than accumulating `interval` onto the previous pulse, so
/// a late wakeup (scheduler jitter, a slow tick) never compounds drift —
/// the next pulse returned is always the true next multiple of `interval`
/// after `now`.
pub struct ClockGenerator {
    anchor: Option<Instant>,
    bpm: f64,
    pulse: u64,
}

impl ClockGenerator {
    pub fn new(bpm: f64) -> Self {
        Self {
            anchor: None,
            bpm,
            pulse: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / (self.bpm * 24.0))
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn start(&mut self, anchor_time: Instant, bpm: f64) {
        self.anchor = Some(anchor_time);
        self.bpm = bpm;
        self.pulse = 0;
    }

    pub fn stop(&mut self) {
        self.anchor = None;
        self.pulse = 0;
    }

    /// Recomputes the target pulse interval; the anchor is untouched, so
    /// the BPM change is picked up on the very next recomputed pulse
    /// without resetting where the clock "counts from".
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    /// Timestamp of the next pulse strictly after `now`, or `None` if the
    /// clock isn't running.
    pub fn next_due(&mut self, now: Instant) -> Option<Instant> {
        let anchor = self.anchor?;
        let interval = self.interval();
        if now < anchor {
            self.pulse = 0;
            return Some(anchor);
        }
        let elapsed = now.duration_since(anchor).as_secs_f64();
        let k = (elapsed / interval.as_secs_f64()).floor() as u64 + 1;
        self.pulse = k;
        Some(anchor + interval.mul_f64(k as f64))
    }

    pub fn pulse_count(&self) -> u64 {
        self.pulse
    }
}

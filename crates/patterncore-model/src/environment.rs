use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Global settings shared across a [`crate::session::Session`].
///
/// Older documents carried deprecated `scale`/`chords` fields on this type;
/// they're dropped from the typed model and fall into `extra` so legacy
/// payloads still round-trip through JSON without a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub bpm: f64,
    #[serde(default)]
    pub swing: f64,
    #[serde(default = "default_gate")]
    pub default_gate: f64,
    #[serde(default = "default_loop_steps")]
    pub loop_steps: u16,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_gate() -> f64 {
    0.5
}

/// The loop is always 256 steps, carried as a field on the wire but never
/// actually varied.
pub const LOOP_STEPS: u16 = 256;

fn default_loop_steps() -> u16 {
    LOOP_STEPS
}

impl Environment {
    pub fn validate(&self) -> Result<()> {
        if !(self.bpm > 0.0) {
            return Err(ModelError::OutOfRange {
                field: "environment.bpm".into(),
                detail: format!("must be > 0, got {}", self.bpm),
            });
        }
        if !(0.0..=1.0).contains(&self.swing) {
            return Err(ModelError::OutOfRange {
                field: "environment.swing".into(),
                detail: format!("must be within 0.0..=1.0, got {}", self.swing),
            });
        }
        if !(0.0..=1.0).contains(&self.default_gate) {
            return Err(ModelError::OutOfRange {
                field: "environment.default_gate".into(),
                detail: format!("must be within 0.0..=1.0, got {}", self.default_gate),
            });
        }
        if self.loop_steps != LOOP_STEPS {
            return Err(ModelError::OutOfRange {
                field: "environment.loop_steps".into(),
                detail: "loop_steps is fixed at 256 and must not be varied".into(),
            });
        }
        Ok(())
    }

    pub fn step_duration_secs(&self) -> f64 {
        60.0 / self.bpm / 4.0
    }
}

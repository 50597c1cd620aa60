use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerLine {
    pub name: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "unity")]
    pub volume: f64,
    #[serde(default = "half")]
    pub pan: f64,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub output: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamics: Option<Value>,
    #[serde(default, flatten)]
    pub fx: Map<String, Value>,
}

fn unity() -> f64 {
    1.0
}

fn half() -> f64 {
    0.5
}

impl MixerLine {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.pan) {
            return Err(ModelError::OutOfRange {
                field: "mixer_line.pan".into(),
                detail: format!("must be within 0.0..=1.0, got {}", self.pan),
            });
        }
        Ok(())
    }
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, Result};

/// A modulation target is opaque to the core — clients may attach any
/// free-form modulation description (LFO, envelope, sequencer lane, ...).
/// The core never interprets the shape, only threads it through.
pub type Modulation = Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioTrackMeta {
    pub track_id: String,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Send {
    pub mixer_line_id: String,
    #[serde(default = "unity_gain")]
    pub gain: f64,
    #[serde(default = "half")]
    pub pan: f64,
}

fn unity_gain() -> f64 {
    1.0
}

fn half() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackParams {
    pub s: String,
    #[serde(default)]
    pub n: u32,
    #[serde(default = "unity_gain")]
    pub gain: f64,
    #[serde(default = "half")]
    pub pan: f64,
    #[serde(default = "unity_gain")]
    pub speed: f64,
    #[serde(default)]
    pub begin: f64,
    #[serde(default = "one")]
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cut: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legato: Option<bool>,
    #[serde(flatten, default)]
    pub extra_params: Map<String, Value>,
}

fn one() -> f64 {
    1.0
}

impl AudioTrackParams {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("pan", self.pan), ("begin", self.begin), ("end", self.end)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModelError::OutOfRange {
                    field: format!("params.{field}"),
                    detail: format!("must be within 0.0..=1.0, got {value}"),
                });
            }
        }
        if self.begin > self.end {
            return Err(ModelError::OutOfRange {
                field: "params.begin".into(),
                detail: format!("begin ({}) must be <= end ({})", self.begin, self.end),
            });
        }
        Ok(())
    }
}

/// Effects bundles are never interpreted by the core — only routed opaquely
/// to extensions / the audio engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FxBundle(#[serde(default)] pub Map<String, Value>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub meta: AudioTrackMeta,
    pub params: AudioTrackParams,
    #[serde(default)]
    pub sends: Vec<Send>,
    #[serde(default)]
    pub modulations: HashMap<String, Modulation>,
    #[serde(default)]
    pub fx: FxBundle,
    #[serde(default)]
    pub track_fx: FxBundle,
}

impl AudioTrack {
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        for send in &self.sends {
            if send.mixer_line_id.is_empty() {
                return Err(ModelError::OutOfRange {
                    field: "send.mixer_line_id".into(),
                    detail: "must not be empty".into(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiTrack {
    pub track_id: String,
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    #[serde(default)]
    pub transpose: i8,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub cc_modulations: HashMap<u8, Modulation>,
    #[serde(default)]
    pub expression_modulations: HashMap<String, Modulation>,
}

fn default_velocity() -> u8 {
    100
}

impl MidiTrack {
    pub fn validate(&self) -> Result<()> {
        if self.channel > 15 {
            return Err(ModelError::OutOfRange {
                field: "tracks_midi.channel".into(),
                detail: format!("must be within 0..=15, got {}", self.channel),
            });
        }
        if self.velocity > 127 {
            return Err(ModelError::OutOfRange {
                field: "tracks_midi.velocity".into(),
                detail: format!("must be within 0..=127, got {}", self.velocity),
            });
        }
        Ok(())
    }
}

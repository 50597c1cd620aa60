use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    environment::Environment, event::EventSequence, mixer::MixerLine, track::AudioTrack,
    track::MidiTrack,
};

/// A named snapshot of a subset of [`crate::session::Session`] fields, used
/// for atomic switching. Scenes never nest and never carry an `apply` of
/// their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub tracks: HashMap<String, AudioTrack>,
    #[serde(default)]
    pub tracks_midi: HashMap<String, MidiTrack>,
    #[serde(default)]
    pub sequences: HashMap<String, EventSequence>,
    #[serde(default)]
    pub mixer_lines: HashMap<String, MixerLine>,
}

impl Scene {
    pub fn rebuild_indices(&mut self) {
        for seq in self.sequences.values_mut() {
            seq.rebuild_index();
        }
    }
}

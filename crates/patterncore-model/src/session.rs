use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    apply::ApplyCommand,
    environment::Environment,
    error::{ModelError, Result},
    event::EventSequence,
    mixer::MixerLine,
    scene::Scene,
    track::{AudioTrack, MidiTrack},
};

/// The top-level performance document. Immutable after construction —
/// "updates" always produce a new `Session` that replaces the prior one
/// atomically via [`crate::apply::ApplyCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub environment: Environment,
    #[serde(default)]
    pub tracks: HashMap<String, AudioTrack>,
    #[serde(default)]
    pub tracks_midi: HashMap<String, MidiTrack>,
    #[serde(default)]
    pub mixer_lines: HashMap<String, MixerLine>,
    #[serde(default)]
    pub sequences: HashMap<String, EventSequence>,
    #[serde(default)]
    pub scenes: HashMap<String, Scene>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<ApplyCommand>,
}

impl Session {
    /// Rebuilds every sequence's step index — required after
    /// deserialization since the index is never carried on the wire.
    pub fn rebuild_indices(&mut self) {
        for seq in self.sequences.values_mut() {
            seq.rebuild_index();
        }
        for scene in self.scenes.values_mut() {
            scene.rebuild_indices();
        }
    }

    /// Checks numeric ranges on every contained piece, and that every id
    /// referenced by a send, mixer include, or apply command resolves
    /// within this session.
    pub fn validate(&self) -> Result<()> {
        self.environment.validate()?;

        for track in self.tracks.values() {
            track.validate()?;
        }
        for track in self.tracks_midi.values() {
            track.validate()?;
        }
        for line in self.mixer_lines.values() {
            line.validate()?;
            for track_id in &line.include {
                self.resolve_track_id(track_id, "mixer_line.include")?;
            }
        }
        for (track_id, seq) in &self.sequences {
            if !self.tracks.contains_key(track_id) && !self.tracks_midi.contains_key(track_id) {
                return Err(ModelError::OrphanSequence {
                    track_id: track_id.clone(),
                });
            }
            seq.validate()?;
        }
        for track in self.tracks.values() {
            for send in &track.sends {
                if !self.mixer_lines.contains_key(&send.mixer_line_id) {
                    return Err(ModelError::DanglingReference {
                        field: "send.mixer_line_id".into(),
                        id: send.mixer_line_id.clone(),
                    });
                }
            }
        }
        if let Some(apply) = &self.apply {
            for track_id in &apply.track_ids {
                self.resolve_track_id(track_id, "apply.track_ids")?;
            }
            if let Some(scene_name) = &apply.scene_name {
                if !self.scenes.contains_key(scene_name) {
                    return Err(ModelError::DanglingReference {
                        field: "apply.scene_name".into(),
                        id: scene_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve_track_id(&self, track_id: &str, field: &str) -> Result<()> {
        if self.tracks.contains_key(track_id) || self.tracks_midi.contains_key(track_id) {
            Ok(())
        } else {
            Err(ModelError::DanglingReference {
                field: field.into(),
                id: track_id.into(),
            })
        }
    }

    pub fn active_track_ids(&self) -> std::collections::HashSet<String> {
        self.tracks
            .keys()
            .chain(self.tracks_midi.keys())
            .cloned()
            .collect()
    }

    pub fn scene_names(&self) -> Vec<String> {
        self.scenes.keys().cloned().collect()
    }

    /// Merges `scene` into `self`, replacing same-keyed entries and
    /// preserving entries not present in the scene. There is no deletion
    /// semantics via scenes — activating one only adds or overwrites.
    pub fn apply_scene(&mut self, scene: &Scene) {
        if let Some(env) = &scene.environment {
            self.environment = env.clone();
        }
        for (id, track) in &scene.tracks {
            self.tracks.insert(id.clone(), track.clone());
        }
        for (id, track) in &scene.tracks_midi {
            self.tracks_midi.insert(id.clone(), track.clone());
        }
        for (id, seq) in &scene.sequences {
            let mut seq = seq.clone();
            seq.rebuild_index();
            self.sequences.insert(id.clone(), seq);
        }
        for (id, line) in &scene.mixer_lines {
            self.mixer_lines.insert(id.clone(), line.clone());
        }
    }
}

/// The two session shapes clients may submit: the layered/compiled
/// [`Session`] and the flatter [`crate::batch::ScheduledMessageBatch`].
/// `Session` is the primary in-process representation; the flat shape is
/// converted up front (see
/// [`crate::batch::ScheduledMessageBatch::into_session`]) rather than kept
/// as a second code path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionDocument {
    Compiled(Session),
    Flat(crate::batch::ScheduledMessageBatch),
}

impl SessionDocument {
    pub fn into_session(self) -> Session {
        match self {
            SessionDocument::Compiled(mut session) => {
                session.rebuild_indices();
                session
            }
            SessionDocument::Flat(batch) => batch.into_session(),
        }
    }

    pub fn apply_timing(&self) -> Option<crate::apply::ApplyCommand> {
        match self {
            SessionDocument::Compiled(session) => session.apply.clone(),
            SessionDocument::Flat(batch) => batch.apply.clone(),
        }
    }
}

pub fn parse_session_document(bytes: &[u8]) -> Result<SessionDocument> {
    serde_json::from_slice(bytes).map_err(|e| ModelError::Deserialize(e.to_string()))
}

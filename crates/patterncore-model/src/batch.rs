use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    apply::ApplyCommand,
    environment::Environment,
    event::{Event, EventSequence},
    session::Session,
    track::{AudioTrack, AudioTrackMeta, AudioTrackParams, FxBundle},
};

/// The flat, destination-agnostic wire form: a submission shape simpler
/// than a full [`Session`], favored by recent documents over the layered
/// form. `pattern_length` (in cycles) * 16 = total active step count, which
/// must stay <= 256.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub destination_id: String,
    pub cycle: f64,
    pub step: u16,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMessageBatch {
    pub messages: Vec<ScheduledMessage>,
    pub bpm: f64,
    pub pattern_length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<ApplyCommand>,
}

impl ScheduledMessageBatch {
    pub fn active_steps(&self) -> u16 {
        ((self.pattern_length * 16.0).round() as i64).clamp(0, 256) as u16
    }

    /// Synthesizes a one-track-per-destination [`Session`] so the rest of
    /// the pipeline (store, router, engine) only ever deals with `Session`
    /// — the flat shape converts up front rather than forking every
    /// downstream consumer.
    pub fn into_session(self) -> Session {
        let mut tracks = std::collections::HashMap::new();
        let mut sequences = std::collections::HashMap::new();

        let mut by_destination: std::collections::HashMap<String, Vec<Event>> =
            std::collections::HashMap::new();
        for msg in self.messages {
            let velocity = msg
                .params
                .get("velocity")
                .and_then(Value::as_f64)
                .unwrap_or(1.0);
            let gate = msg.params.get("gate").and_then(Value::as_f64).unwrap_or(0.5);
            let note = msg
                .params
                .get("note")
                .and_then(Value::as_u64)
                .map(|n| n as u8);
            by_destination
                .entry(msg.destination_id.clone())
                .or_default()
                .push(Event {
                    step: msg.step,
                    velocity,
                    note,
                    gate,
                    offset_ms: 0.0,
                });

            tracks
                .entry(msg.destination_id.clone())
                .or_insert_with(|| AudioTrack {
                    meta: AudioTrackMeta {
                        track_id: msg.destination_id.clone(),
                        mute: false,
                        solo: false,
                    },
                    params: AudioTrackParams {
                        s: msg.destination_id.clone(),
                        n: 0,
                        gain: 1.0,
                        pan: 0.5,
                        speed: 1.0,
                        begin: 0.0,
                        end: 1.0,
                        cut: None,
                        legato: None,
                        extra_params: msg.params.clone(),
                    },
                    sends: Vec::new(),
                    modulations: Default::default(),
                    fx: FxBundle::default(),
                    track_fx: FxBundle::default(),
                });
        }

        for (track_id, events) in by_destination {
            sequences.insert(track_id.clone(), EventSequence::new(track_id, events));
        }

        Session {
            environment: Environment {
                bpm: self.bpm,
                swing: 0.0,
                default_gate: 0.5,
                loop_steps: crate::environment::LOOP_STEPS,
                extra: Default::default(),
            },
            tracks,
            tracks_midi: Default::default(),
            mixer_lines: Default::default(),
            sequences,
            scenes: Default::default(),
            apply: self.apply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_steps_caps_at_256() {
        let batch = ScheduledMessageBatch {
            messages: vec![],
            bpm: 120.0,
            pattern_length: 32.0,
            apply: None,
        };
        assert_eq!(batch.active_steps(), 256);
    }

    #[test]
    fn into_session_groups_by_destination() {
        let batch = ScheduledMessageBatch {
            messages: vec![
                ScheduledMessage {
                    destination_id: "kick".into(),
                    cycle: 0.0,
                    step: 0,
                    params: Map::new(),
                },
                ScheduledMessage {
                    destination_id: "kick".into(),
                    cycle: 0.0,
                    step: 4,
                    params: Map::new(),
                },
            ],
            bpm: 120.0,
            pattern_length: 1.0,
            apply: None,
        };
        let session = batch.into_session();
        assert_eq!(session.tracks.len(), 1);
        assert_eq!(session.sequences["kick"].events.len(), 2);
    }
}

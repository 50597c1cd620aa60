use std::collections::HashMap;

use patterncore_model::{Event, ScheduledMessage, Session};
use serde_json::{Map, Value};

/// The installed session plus a per-step flattening into [`ScheduledMessage`]
/// form, built once at load time so `messages_at` is also O(1), matching
/// `events_at`'s complexity.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub session: Session,
    message_index: HashMap<u16, Vec<ScheduledMessage>>,
}

impl LoadedSession {
    pub fn new(session: Session) -> Self {
        let message_index = build_message_index(&session);
        Self {
            session,
            message_index,
        }
    }

    pub fn events_at<'a>(&'a self, track_id: &str, step: u16) -> Vec<&'a Event> {
        match self.session.sequences.get(track_id) {
            Some(seq) => seq.events_at(step).collect(),
            None => Vec::new(),
        }
    }

    pub fn messages_at(&self, step: u16) -> &[ScheduledMessage] {
        self.message_index
            .get(&step)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Lowers every (track, event) pair into the flat [`ScheduledMessage`] shape
/// and buckets by step, preserving each sequence's input order within a
/// step.
fn build_message_index(session: &Session) -> HashMap<u16, Vec<ScheduledMessage>> {
    let mut index: HashMap<u16, Vec<ScheduledMessage>> = HashMap::new();
    for (track_id, seq) in &session.sequences {
        for event in &seq.events {
            let mut params = Map::new();
            if let Some(track) = session.tracks.get(track_id) {
                params.clone_from(&track.params.extra_params);
                params.insert("s".into(), Value::String(track.params.s.clone()));
                params.insert("n".into(), Value::from(track.params.n));
                params.insert("gain".into(), Value::from(track.params.gain * event.velocity));
                params.insert("pan".into(), Value::from(track.params.pan));
                params.insert("speed".into(), Value::from(track.params.speed));
                params.insert("begin".into(), Value::from(track.params.begin));
                params.insert("end".into(), Value::from(track.params.end));
                if let Some(legato) = track.params.legato {
                    params.insert("legato".into(), Value::from(legato));
                }
                if let Some(cut) = track.params.cut {
                    params.insert("cut".into(), Value::from(cut));
                }
                let mixer_line_id = track
                    .sends
                    .first()
                    .map(|s| s.mixer_line_id.clone())
                    .unwrap_or_default();
                params.insert("mixer_line_id".into(), Value::String(mixer_line_id));
            } else {
                params.insert("velocity".into(), Value::from(event.velocity));
            }
            if let Some(note) = event.note {
                params.insert("note".into(), Value::from(note));
            }
            params.insert("gate".into(), Value::from(event.gate));
            // Engine-internal micro-timing hint; stripped before OSC emission
            // so it never reaches the wire. Carried as a regular params key
            // (rather than a separate field on `ScheduledMessage`) so it
            // flows through `before_send` like any other opaque param and
            // extensions can observe or rewrite it.
            if event.offset_ms != 0.0 {
                params.insert("_offset_ms".into(), Value::from(event.offset_ms));
            }

            index.entry(event.step).or_default().push(ScheduledMessage {
                destination_id: track_id.clone(),
                cycle: event.step as f64 / 16.0,
                step: event.step,
                params,
            });
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use patterncore_model::{
        AudioTrack, AudioTrackMeta, AudioTrackParams, Environment, EventSequence, FxBundle,
        LOOP_STEPS,
    };
    use std::collections::HashMap as Map2;

    fn session_with_kick() -> Session {
        let mut tracks = Map2::new();
        tracks.insert(
            "kick".to_string(),
            AudioTrack {
                meta: AudioTrackMeta { track_id: "kick".into(), mute: false, solo: false },
                params: AudioTrackParams {
                    s: "bd".into(),
                    n: 0,
                    gain: 1.0,
                    pan: 0.5,
                    speed: 1.0,
                    begin: 0.0,
                    end: 1.0,
                    cut: None,
                    legato: None,
                    extra_params: Default::default(),
                },
                sends: vec![],
                modulations: Default::default(),
                fx: FxBundle::default(),
                track_fx: FxBundle::default(),
            },
        );
        let mut sequences = Map2::new();
        sequences.insert(
            "kick".to_string(),
            EventSequence::new(
                "kick",
                vec![Event { step: 0, velocity: 0.5, note: None, gate: 0.5, offset_ms: 0.0 }],
            ),
        );
        Session {
            environment: Environment {
                bpm: 120.0,
                swing: 0.0,
                default_gate: 0.5,
                loop_steps: LOOP_STEPS,
                extra: Default::default(),
            },
            tracks,
            tracks_midi: Default::default(),
            mixer_lines: Default::default(),
            sequences,
            scenes: Default::default(),
            apply: None,
        }
    }

    #[test]
    fn messages_at_applies_velocity_scaled_gain() {
        let loaded = LoadedSession::new(session_with_kick());
        let msgs = loaded.messages_at(0);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].params.get("gain").unwrap(), &Value::from(0.5));
    }

    #[test]
    fn messages_at_empty_step_returns_empty_slice() {
        let loaded = LoadedSession::new(session_with_kick());
        assert!(loaded.messages_at(200).is_empty());
    }
}

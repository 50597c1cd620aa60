use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use patterncore_model::{Event, ScheduledMessage, Session};

use crate::loaded::LoadedSession;

/// Owns the currently active session and answers per-step lookups in O(1)
/// expected time.
///
/// `load` installs a new session atomically: readers via [`ArcSwap::load`]
/// never observe a partially-built step index, because the index is built
/// before the swap, not after.
pub struct MessageStore {
    current: ArcSwap<LoadedSession>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(Session::empty())
    }
}

impl MessageStore {
    pub fn new(session: Session) -> Self {
        Self {
            current: ArcSwap::from_pointee(LoadedSession::new(session)),
        }
    }

    /// Installs `session` as the currently active one. The caller is
    /// responsible for having already validated it — a malformed session
    /// must fail before reaching here, leaving the previously loaded store
    /// untouched.
    pub fn load(&self, session: Session) {
        let loaded = Arc::new(LoadedSession::new(session));
        self.current.store(loaded);
    }

    pub fn session(&self) -> Arc<LoadedSession> {
        self.current.load_full()
    }

    pub fn get_events_at(&self, track_id: &str, step: u16) -> Vec<Event> {
        self.current
            .load()
            .events_at(track_id, step)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get_messages_at(&self, step: u16) -> Vec<ScheduledMessage> {
        self.current.load().messages_at(step).to_vec()
    }

    pub fn active_track_ids(&self) -> HashSet<String> {
        self.current.load().session.active_track_ids()
    }

    pub fn scenes(&self) -> Vec<String> {
        self.current.load().session.scene_names()
    }
}

trait SessionExt {
    fn empty() -> Self;
}

impl SessionExt for Session {
    fn empty() -> Self {
        Session {
            environment: patterncore_model::Environment {
                bpm: 120.0,
                swing: 0.0,
                default_gate: 0.5,
                loop_steps: patterncore_model::LOOP_STEPS,
                extra: Default::default(),
            },
            tracks: Default::default(),
            tracks_midi: Default::default(),
            mixer_lines: Default::default(),
            sequences: Default::default(),
            scenes: Default::default(),
            apply: None,
        }
    }
}

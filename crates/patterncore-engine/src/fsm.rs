//! Transport state machine for the loop engine.
//!
//! Mirrors the explicit `transition(event) -> TransitionResult` shape used
//! elsewhere for transport state: state changes happen in one place, never
//! as implicit mutation sprinkled through call sites.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Start,
    Stop,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// No-op: engine was already in a state where the event has no effect
    /// (e.g. `Start` while already `Playing`).
    None,
    /// Transitioned `Stopped -> Playing`: position resets to 0 and a fresh
    /// anchor is taken.
    StartedFresh,
    /// Transitioned `Paused -> Playing`: re-anchored without resetting the
    /// step cursor.
    Resumed,
    /// Transitioned to `Stopped`: cursor resets to 0, pending note-offs are
    /// flushed, MIDI Stop is emitted.
    Stopped,
    /// Transitioned `Playing -> Paused`: cursor freezes in place.
    Paused,
}

#[derive(Debug, Default)]
pub struct TransportFsm {
    state: EngineState,
}

impl TransportFsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn transition(&mut self, event: TransportEvent) -> TransitionResult {
        use EngineState::*;
        use TransportEvent::*;

        match (self.state, event) {
            (Stopped, Start) => {
                self.state = Playing;
                TransitionResult::StartedFresh
            }
            (Paused, Start) => {
                self.state = Playing;
                TransitionResult::Resumed
            }
            (Playing, Start) => TransitionResult::None,

            (Stopped, Stop) => TransitionResult::None,
            (Playing, Stop) | (Paused, Stop) => {
                self.state = Stopped;
                TransitionResult::Stopped
            }

            (Playing, Pause) => {
                self.state = Paused;
                TransitionResult::Paused
            }
            (Stopped, Pause) | (Paused, Pause) => TransitionResult::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_from_stopped_resets_position() {
        let mut fsm = TransportFsm::new();
        assert_eq!(fsm.transition(TransportEvent::Start), TransitionResult::StartedFresh);
        assert_eq!(fsm.state(), EngineState::Playing);
    }

    #[test]
    fn start_is_idempotent_while_playing() {
        let mut fsm = TransportFsm::new();
        fsm.transition(TransportEvent::Start);
        assert_eq!(fsm.transition(TransportEvent::Start), TransitionResult::None);
    }

    #[test]
    fn resume_from_paused_does_not_reset_position() {
        let mut fsm = TransportFsm::new();
        fsm.transition(TransportEvent::Start);
        fsm.transition(TransportEvent::Pause);
        assert_eq!(fsm.transition(TransportEvent::Start), TransitionResult::Resumed);
    }

    #[test]
    fn stop_from_any_state_resets_to_stopped() {
        let mut fsm = TransportFsm::new();
        fsm.transition(TransportEvent::Start);
        assert_eq!(fsm.transition(TransportEvent::Stop), TransitionResult::Stopped);
        assert_eq!(fsm.state(), EngineState::Stopped);
    }
}

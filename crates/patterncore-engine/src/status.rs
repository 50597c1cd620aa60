use serde::Serialize;

use crate::fsm::EngineState;
use crate::position::Position;

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub playing: bool,
    pub playback_state: &'static str,
    pub bpm: f64,
    pub position: Position,
    pub active_tracks: Vec<String>,
    pub has_pending: bool,
    pub scenes: Vec<String>,
    pub current_scene: Option<String>,
}

pub fn state_name(state: EngineState) -> &'static str {
    match state {
        EngineState::Stopped => "stopped",
        EngineState::Playing => "playing",
        EngineState::Paused => "paused",
    }
}

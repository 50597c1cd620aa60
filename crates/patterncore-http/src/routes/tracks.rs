use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_tracks(State(state): State<AppState>) -> Json<Value> {
    let loaded = state.store.session();
    let audio = loaded.session.tracks.values().map(|t| {
        json!({"track_id": t.meta.track_id, "kind": "audio", "mute": t.meta.mute, "solo": t.meta.solo})
    });
    let midi = loaded.session.tracks_midi.values().map(|t| {
        json!({"track_id": t.track_id, "kind": "midi", "mute": t.mute, "solo": t.solo})
    });
    Json(Value::Array(audio.chain(midi).collect()))
}

pub async fn get_track(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let loaded = state.store.session();
    if let Some(t) = loaded.session.tracks.get(&track_id) {
        return Ok(Json(serde_json::to_value(t).unwrap_or_default()));
    }
    if let Some(t) = loaded.session.tracks_midi.get(&track_id) {
        return Ok(Json(serde_json::to_value(t).unwrap_or_default()));
    }
    Err(ApiError::NotFound(format!("unknown track id `{track_id}`")))
}

#[derive(Deserialize)]
pub struct MuteBody {
    muted: bool,
}

pub async fn set_mute(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
    Json(body): Json<MuteBody>,
) -> Result<Json<Value>, ApiError> {
    state.engine.set_mute(&track_id, body.muted)?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Deserialize)]
pub struct SoloBody {
    solo: bool,
}

pub async fn set_solo(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
    Json(body): Json<SoloBody>,
) -> Result<Json<Value>, ApiError> {
    state.engine.set_solo(&track_id, body.solo)?;
    Ok(Json(json!({"status": "ok"})))
}

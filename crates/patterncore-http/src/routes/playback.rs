use axum::extract::{Path, State};
use axum::Json;
use patterncore_model::{ApplyTiming, ModelError, SessionDocument};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Pulls an optional sibling `"timing"` key out of a patch body so the rest
/// of the object can be handed to the merge-patch path untouched. Absent or
/// unparseable, falls back to [`ApplyTiming::default`].
fn extract_timing(body: &mut Value) -> ApplyTiming {
    extract_timing_if_present(body).unwrap_or_default()
}

/// Same extraction as [`extract_timing`], but without collapsing "absent or
/// unparseable" into the default — callers that have their own fallback
/// (e.g. `post_session`'s `apply.timing` vs. top-level `"timing"`) need to
/// tell "not given" apart from "given as the default value".
fn extract_timing_if_present(body: &mut Value) -> Option<ApplyTiming> {
    let obj = body.as_object_mut()?;
    obj.remove("timing").and_then(|t| serde_json::from_value(t).ok())
}

pub async fn post_session(
    State(state): State<AppState>,
    Json(mut raw): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    // A sibling top-level `"timing"` key is accepted the same way the PATCH
    // handlers accept one (see `extract_timing`), alongside the nested
    // `apply.timing` the data model itself carries.
    let top_level_timing = extract_timing_if_present(&mut raw);
    let transformed = state
        .engine
        .extensions()
        .transform(raw)
        .map_err(|e| ApiError::ExtensionTransform { extension: e.extension, detail: e.detail })?;
    let doc: SessionDocument = serde_json::from_value(transformed)
        .map_err(|e| ApiError::Validation(ModelError::Deserialize(e.to_string())))?;
    // The session-install endpoint's own default differs from
    // `ApplyCommand`'s general default (`beat`): an unspecified timing here
    // means "next bar", not "next beat".
    let timing = top_level_timing
        .or_else(|| doc.apply_timing().map(|c| c.timing))
        .unwrap_or(ApplyTiming::Bar);
    let session = doc.into_session();
    session.validate()?;
    let change_id = state.engine.load_session(session, timing);
    info!(change_id, ?timing, "session scheduled for install");
    Ok(Json(json!({"status": "scheduled", "change_id": change_id, "timing": timing})))
}

pub async fn post_start(State(state): State<AppState>) -> Json<Value> {
    state.engine.start();
    Json(json!({"status": "ok"}))
}

pub async fn post_stop(State(state): State<AppState>) -> Json<Value> {
    state.engine.stop();
    Json(json!({"status": "ok"}))
}

pub async fn post_pause(State(state): State<AppState>) -> Json<Value> {
    state.engine.pause();
    Json(json!({"status": "ok"}))
}

pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.engine.status()).unwrap_or_default())
}

pub async fn patch_environment(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Json<Value> {
    let timing = extract_timing(&mut body);
    let change_id = state.engine.patch_environment(body, timing);
    Json(json!({"status": "scheduled", "change_id": change_id, "timing": timing}))
}

pub async fn patch_track_params(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let timing = extract_timing(&mut body);
    let change_id = state.engine.patch_track_params(track_id, body, timing)?;
    Ok(Json(json!({"status": "scheduled", "change_id": change_id, "timing": timing})))
}

#[derive(Deserialize)]
pub struct TriggerOsc {
    track_id: String,
    velocity: f64,
    #[serde(default)]
    note: Option<u8>,
}

pub async fn trigger_osc(State(state): State<AppState>, Json(body): Json<TriggerOsc>) -> Json<Value> {
    let mut params = serde_json::Map::new();
    params.insert("velocity".into(), json!(body.velocity));
    if let Some(note) = body.note {
        params.insert("note".into(), json!(note));
    }
    state.engine.trigger_osc(&body.track_id, Value::Object(params));
    Json(json!({"status": "sent"}))
}

/// Matches what `MidiTrack::velocity` would produce from a `0.0..=1.0`
/// fraction (see [`patterncore_model::MidiTrack`]'s own default), and the
/// default note-off delay used when a one-shot trigger omits `duration_ms`.
const DEFAULT_TRIGGER_DURATION_MS: u64 = 200;

#[derive(Deserialize)]
pub struct TriggerMidi {
    track_id: String,
    note: u8,
    velocity: f64,
    #[serde(default)]
    duration_ms: Option<u64>,
}

pub async fn trigger_midi(
    State(state): State<AppState>,
    Json(body): Json<TriggerMidi>,
) -> Result<Json<Value>, ApiError> {
    let loaded = state.store.session();
    let track = loaded
        .session
        .tracks_midi
        .get(&body.track_id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown track id `{}`", body.track_id)))?;
    let channel = track.channel;
    let velocity = (body.velocity.clamp(0.0, 1.0) * 127.0).round() as u8;
    let duration_ms = body.duration_ms.unwrap_or(DEFAULT_TRIGGER_DURATION_MS);
    state.engine.trigger_midi(channel, body.note, velocity, duration_ms);
    Ok(Json(json!({"status": "sent"})))
}

pub async fn get_pending_changes(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.engine.pending_changes()).unwrap_or_default())
}

pub async fn delete_pending_change(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.engine.cancel_change(&id)?;
    Ok(Json(json!({"status": "cancelled"})))
}

pub async fn cancel_all_changes(State(state): State<AppState>) -> Json<Value> {
    state.engine.cancel_all_changes();
    Json(json!({"status": "cancelled_all"}))
}

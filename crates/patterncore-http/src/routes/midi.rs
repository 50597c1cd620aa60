use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_ports(State(_state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let ports = patterncore_router::MidiSender::list_ports()?;
    Ok(Json(json!(ports)))
}

#[derive(Deserialize)]
pub struct SetPort {
    port_name: String,
}

/// No in-process contention to detect: this server holds a single
/// [`patterncore_router::MidiSender`] per process, and `connect` always
/// closes whatever was open before opening the new port (see its own
/// doc comment), so the 409 "port in use" case in the error handling
/// design never arises here — only "port not found" (404) is reachable.
pub async fn set_port(
    State(state): State<AppState>,
    Json(body): Json<SetPort>,
) -> Result<Json<Value>, ApiError> {
    let ports = patterncore_router::MidiSender::list_ports()?;
    if !ports.contains(&body.port_name) {
        return Err(ApiError::NotFound(format!("unknown midi port `{}`", body.port_name)));
    }
    state.midi.connect(&body.port_name);
    Ok(Json(json!({"status": "ok"})))
}

pub async fn panic(State(state): State<AppState>) -> Json<Value> {
    state.engine.panic();
    Json(json!({"status": "ok"}))
}

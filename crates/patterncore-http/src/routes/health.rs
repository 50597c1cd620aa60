use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = state.engine.status();
    Json(json!({
        "status": "ok",
        "engine_state": status.playback_state,
        "uptime_secs": state.uptime_secs(),
    }))
}

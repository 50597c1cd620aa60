use axum::extract::State;
use axum::Json;
use patterncore_model::ApplyTiming;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ActivateScene {
    scene_id: String,
    #[serde(default)]
    timing: ApplyTiming,
}

pub async fn activate_scene(
    State(state): State<AppState>,
    Json(body): Json<ActivateScene>,
) -> Result<Json<Value>, ApiError> {
    let change_id = state.engine.activate_scene(body.scene_id, body.timing)?;
    Ok(Json(json!({"status": "scheduled", "change_id": change_id, "timing": body.timing})))
}

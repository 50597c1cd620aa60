use axum::extract::{Path, State};
use axum::Json;
use patterncore_sse::SseEvent;
use patterncore_store::UpsertOutcome;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn upsert_client_metadata(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Json(metadata): Json<Value>,
) -> Json<Value> {
    let outcome = state.clients.upsert(&client_id, metadata);
    let event = match outcome {
        UpsertOutcome::Connected => SseEvent::ClientConnected { client_id: client_id.clone() },
        UpsertOutcome::Updated => SseEvent::ClientMetadataUpdated { client_id: client_id.clone() },
    };
    state.broker.publish(event);
    Json(json!({"status": "ok"}))
}

pub async fn list_clients(State(state): State<AppState>) -> Json<Value> {
    let clients = state.clients.get_all();
    let out: serde_json::Map<String, Value> = clients
        .into_iter()
        .map(|(id, record)| (id, record.metadata))
        .collect();
    Json(Value::Object(out))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state.clients.get(&client_id)?;
    Ok(Json(record.metadata))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.clients.delete(&client_id)?;
    state.broker.publish(SseEvent::ClientDisconnected { client_id });
    Ok(Json(json!({"status": "ok"})))
}

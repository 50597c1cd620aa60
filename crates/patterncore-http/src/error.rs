use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use patterncore_engine::EngineError;
use patterncore_model::ModelError;
use patterncore_router::SenderError;
use patterncore_store::StoreError;
use serde_json::json;
use thiserror::Error;

/// Every way a request can fail, mapped to the status codes in the error
/// handling design: validation -> 422, not-found -> 404, conflict -> 409,
/// extension transform failure -> 500. Transient I/O (UDP/MIDI write
/// failures) never reaches here — those are logged and counted inside the
/// router/senders and never surfaced to HTTP.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ModelError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("extension `{extension}` failed: {detail}")]
    ExtensionTransform { extension: String, detail: String },

    #[error("midi backend error: {0}")]
    MidiBackend(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidSession(e) => ApiError::Validation(e),
            EngineError::UnknownChange(id) => ApiError::NotFound(format!("unknown pending change id `{id}`")),
            EngineError::UnknownTrack(id) => ApiError::NotFound(format!("unknown track id `{id}`")),
            EngineError::UnknownScene(name) => ApiError::NotFound(format!("unknown scene `{name}`")),
            EngineError::ExtensionTransform { extension, detail } => {
                ApiError::ExtensionTransform { extension, detail }
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidSession(e) => ApiError::Validation(e),
            StoreError::UnknownClient(id) => ApiError::NotFound(format!("unknown client id `{id}`")),
        }
    }
}

impl From<SenderError> for ApiError {
    fn from(err: SenderError) -> Self {
        ApiError::MidiBackend(err.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ExtensionTransform { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MidiBackend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(e) => json!({"error": "validation", "detail": e.to_string()}),
            ApiError::ExtensionTransform { extension, detail } => {
                json!({"error": "extension_transform", "extension": extension, "detail": detail})
            }
            other => json!({"error": status.canonical_reason().unwrap_or("error"), "detail": other.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

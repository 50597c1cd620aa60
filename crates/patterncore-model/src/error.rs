use thiserror::Error;

/// Errors raised while validating or constructing the session data model.
///
/// Every variant maps to HTTP 422 at the control-plane boundary; the field
/// name is carried so the response body can enumerate offending fields.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("field `{field}` out of range: {detail}")]
    OutOfRange { field: String, detail: String },

    #[error("unknown id `{id}` referenced by `{field}`")]
    DanglingReference { field: String, id: String },

    #[error("sequence `{track_id}` references a track id not present in `tracks` or `tracks_midi`")]
    OrphanSequence { track_id: String },

    #[error("invalid JSON payload: {0}")]
    Deserialize(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

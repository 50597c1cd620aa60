use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("session rejected: {0}")]
    InvalidSession(#[from] patterncore_model::ModelError),

    #[error("unknown pending change id `{0}`")]
    UnknownChange(String),

    #[error("unknown track id `{0}`")]
    UnknownTrack(String),

    #[error("unknown scene `{0}`")]
    UnknownScene(String),

    #[error("extension `{extension}` failed during transform: {detail}")]
    ExtensionTransform { extension: String, detail: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

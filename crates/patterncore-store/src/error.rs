use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("session rejected: {0}")]
    InvalidSession(#[from] patterncore_model::ModelError),

    #[error("unknown client id `{0}`")]
    UnknownClient(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("osc send failed: {0}")]
    Osc(#[from] std::io::Error),

    #[error("midi port error: {0}")]
    MidiPort(String),

    #[error("midi device unavailable")]
    MidiUnavailable,
}

pub type Result<T> = std::result::Result<T, SenderError>;

//! Error types for audio output

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to create audio sink: {0}")]
    SinkCreation(String),

    #[error("Audio sink error: {0}")]
    Sink(String),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

//! Session error types

use audio_mixer::AudioError;
use link_protocol::{ProtocolError, SessionState};
use link_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Adapter not responding: idle for {idle_ms}ms, {failures} consecutive heartbeat failures")]
    LivenessTimeout { idle_ms: u64, failures: u32 },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: SessionState, to: SessionState },

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session not running")]
    NotRunning,

    #[error("Video sink error: {0}")]
    Video(String),
}

impl SessionError {
    /// Errors after which the session cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::LivenessTimeout { .. })
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

//! Error types for the protocol

use thiserror::Error;

/// Protocol error
///
/// Every variant is recoverable: the offending frame is dropped and the
/// stream continues with the next header.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Header too short: need 16 bytes, got {actual}")]
    HeaderTooShort { actual: usize },

    #[error("Invalid protocol magic: expected 0x55AA55AA, got 0x{actual:08X}")]
    BadMagic { actual: u32 },

    #[error("Invalid header checksum for command 0x{command:02X}: got 0x{checksum:08X}")]
    BadChecksum { command: u32, checksum: u32 },

    #[error("Payload too large: {length} bytes (max: {max})")]
    PayloadTooLarge { length: usize, max: usize },

    #[error("Truncated payload for command 0x{command:02X}: need {expected} bytes, got {actual}")]
    TruncatedPayload {
        command: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Payload length mismatch for command 0x{command:02X}: expected {expected}, got {actual}")]
    LengthMismatch {
        command: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid text payload for command 0x{0:02X}")]
    InvalidText(u32),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

//! Frame header codec
//!
//! Every frame starts with a fixed 16-byte little-endian header:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────────────────┐
//! │  Magic   │  Length  │ Command  │ Checksum             │
//! │ 4 bytes  │ 4 bytes  │ 4 bytes  │ Command ^ 0xFFFFFFFF │
//! └──────────┴──────────┴──────────┴──────────────────────┘
//! ```

use crate::{CommandId, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, ProtocolError, ProtocolResult};

/// Parsed, validated frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    pub magic: u32,
    pub length: u32,
    pub command: u32,
    pub checksum: u32,
}

impl MessageHeader {
    /// Build a header for an outbound frame
    pub fn new(command: u32, length: u32) -> Self {
        Self {
            magic: MAGIC,
            length,
            command,
            checksum: checksum(command),
        }
    }

    /// Declared payload length in bytes
    pub fn payload_len(&self) -> usize {
        self.length as usize
    }

    /// Typed command identifier
    pub fn command_id(&self) -> CommandId {
        CommandId::from(self.command)
    }

    /// Check if this header announces a video frame
    pub fn is_video(&self) -> bool {
        self.command_id() == CommandId::VideoData
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.length.to_le_bytes());
        out[8..12].copy_from_slice(&self.command.to_le_bytes());
        out[12..16].copy_from_slice(&self.checksum.to_le_bytes());
        out
    }
}

impl std::fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MessageHeader{{command=0x{:02X} ({:?}), length={}}}",
            self.command,
            self.command_id(),
            self.length
        )
    }
}

/// Checksum for a command id
#[inline]
pub const fn checksum(command: u32) -> u32 {
    command ^ 0xFFFF_FFFF
}

/// Encode a frame header for `command` announcing `payload_len` bytes
pub fn encode_header(command: u32, payload_len: u32) -> [u8; HEADER_SIZE] {
    MessageHeader::new(command, payload_len).encode()
}

/// Decode and validate a frame header
///
/// Only the first 16 bytes of `bytes` are examined. The length limit is
/// checked before the checksum so an oversized frame is always reported as
/// [`ProtocolError::PayloadTooLarge`].
pub fn decode_header(bytes: &[u8]) -> ProtocolResult<MessageHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::HeaderTooShort {
            actual: bytes.len(),
        });
    }

    let word = |offset: usize| {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    };

    let magic = word(0);
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic { actual: magic });
    }

    let length = word(4);
    if length as usize > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            length: length as usize,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let command = word(8);
    let check = word(12);
    if check != checksum(command) {
        return Err(ProtocolError::BadChecksum {
            command,
            checksum: check,
        });
    }

    Ok(MessageHeader {
        magic,
        length,
        command,
        checksum: check,
    })
}

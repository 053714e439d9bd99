//! Audio format and audio control types

use serde::{Deserialize, Serialize};

/// PCM sample format of one audio stream
///
/// Samples are always signed 16-bit little-endian interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: u32 = 2;

    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Resolve the format announced by an AudioData `decode_type`
    pub fn from_decode_type(decode_type: u32) -> Option<Self> {
        let format = match decode_type {
            1 | 2 => Self::new(44_100, 2),
            3 => Self::new(8_000, 1),
            4 => Self::new(48_000, 2),
            5 => Self::new(16_000, 1),
            6 => Self::new(24_000, 1),
            7 => Self::new(16_000, 2),
            _ => return None,
        };
        Some(format)
    }

    /// Bytes in one interleaved frame
    pub fn frame_bytes(&self) -> usize {
        (Self::BYTES_PER_SAMPLE * self.channels as u32) as usize
    }

    /// Bytes per second of audio
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_bytes()
    }

    /// Byte length of `ms` milliseconds, rounded down to a whole frame
    pub fn bytes_for_ms(&self, ms: u64) -> usize {
        let raw = (self.bytes_per_second() as u64 * ms / 1000) as usize;
        raw - raw % self.frame_bytes().max(1)
    }

    /// Duration in milliseconds represented by `bytes`
    pub fn ms_for_bytes(&self, bytes: usize) -> u64 {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return 0;
        }
        (bytes as u64 * 1000) / per_second as u64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(44_100, 2)
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// One-byte audio control command carried in an AudioData payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCommand {
    OutputStart,
    OutputStop,
    InputConfig,
    PhonecallStart,
    PhonecallStop,
    NaviStart,
    NaviStop,
    SiriStart,
    SiriStop,
    MediaStart,
    MediaStop,
    AlertStart,
    AlertStop,
    Other(u8),
}

impl AudioCommand {
    pub const fn code(self) -> u8 {
        match self {
            Self::OutputStart => 1,
            Self::OutputStop => 2,
            Self::InputConfig => 3,
            Self::PhonecallStart => 4,
            Self::PhonecallStop => 5,
            Self::NaviStart => 6,
            Self::NaviStop => 7,
            Self::SiriStart => 8,
            Self::SiriStop => 9,
            Self::MediaStart => 10,
            Self::MediaStop => 11,
            Self::AlertStart => 12,
            Self::AlertStop => 13,
            Self::Other(code) => code,
        }
    }
}

impl From<u8> for AudioCommand {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::OutputStart,
            2 => Self::OutputStop,
            3 => Self::InputConfig,
            4 => Self::PhonecallStart,
            5 => Self::PhonecallStop,
            6 => Self::NaviStart,
            7 => Self::NaviStop,
            8 => Self::SiriStart,
            9 => Self::SiriStop,
            10 => Self::MediaStart,
            11 => Self::MediaStop,
            12 => Self::AlertStart,
            13 => Self::AlertStop,
            other => Self::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_type_table() {
        assert_eq!(AudioFormat::from_decode_type(1), Some(AudioFormat::new(44_100, 2)));
        assert_eq!(AudioFormat::from_decode_type(2), Some(AudioFormat::new(44_100, 2)));
        assert_eq!(AudioFormat::from_decode_type(5), Some(AudioFormat::new(16_000, 1)));
        assert_eq!(AudioFormat::from_decode_type(0), None);
        assert_eq!(AudioFormat::from_decode_type(8), None);
    }

    #[test]
    fn test_duration_math() {
        let format = AudioFormat::new(48_000, 2);
        assert_eq!(format.bytes_per_second(), 192_000);
        assert_eq!(format.bytes_for_ms(20), 3_840);
        assert_eq!(format.ms_for_bytes(192_000), 1000);

        // 44.1k stereo: 176400 B/s, 10ms = 1764 bytes, already frame aligned
        let cd = AudioFormat::default();
        assert_eq!(cd.bytes_for_ms(10) % cd.frame_bytes(), 0);
    }

    #[test]
    fn test_audio_command_roundtrip() {
        for code in 0u8..=20 {
            assert_eq!(AudioCommand::from(code).code(), code);
        }
    }
}

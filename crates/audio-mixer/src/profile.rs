//! Stream kinds and buffering profiles

use std::time::Duration;

use crate::DEFAULT_DUCK_FACTOR;

/// Logical audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Media,
    Navigation,
    Voice,
    Call,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Media,
        StreamKind::Navigation,
        StreamKind::Voice,
        StreamKind::Call,
    ];

    pub fn index(self) -> usize {
        match self {
            StreamKind::Media => 0,
            StreamKind::Navigation => 1,
            StreamKind::Voice => 2,
            StreamKind::Call => 3,
        }
    }

    /// Streams whose activity ducks media
    pub fn ducks_media(self) -> bool {
        matches!(self, StreamKind::Navigation | StreamKind::Voice)
    }

    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Media => "media",
            StreamKind::Navigation => "navigation",
            StreamKind::Voice => "voice",
            StreamKind::Call => "call",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Buffering parameters for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProfile {
    /// Ring buffer length in milliseconds
    pub ring_ms: u64,
    /// Fill level required before draining starts
    pub prefill_ms: u64,
    /// Stops arriving sooner than this after start are deferred
    pub min_hold: Option<Duration>,
}

impl StreamProfile {
    /// Default profile for `kind`
    ///
    /// Media gets the longest window to ride out USB jitter; the others
    /// trade jitter tolerance for latency.
    pub fn for_kind(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Media => Self {
                ring_ms: 500,
                prefill_ms: 150,
                min_hold: None,
            },
            StreamKind::Navigation => Self {
                ring_ms: 240,
                prefill_ms: 75,
                min_hold: Some(Duration::from_millis(300)),
            },
            StreamKind::Voice => Self {
                ring_ms: 200,
                prefill_ms: 75,
                min_hold: Some(Duration::from_millis(200)),
            },
            StreamKind::Call => Self {
                ring_ms: 160,
                prefill_ms: 75,
                min_hold: None,
            },
        }
    }
}

/// Mixer tuning
#[derive(Debug, Clone, PartialEq)]
pub struct MixerConfig {
    /// Indexed by [`StreamKind::index`]
    pub profiles: [StreamProfile; 4],
    /// Media gain multiplier while navigation or voice is active
    pub duck_factor: f32,
    /// Underrun delta per check that triggers re-buffering
    pub underrun_threshold: u64,
    /// Fill level under which a stream counts as starved
    pub near_empty_ms: u64,
    pub underrun_check_interval: Duration,
    /// Audio moved to a sink per drain pass
    pub drain_chunk_ms: u64,
    /// Sleep when a drain pass found nothing to do
    pub idle_sleep: Duration,
    /// Bound on waiting for the drain thread at teardown
    pub join_timeout: Duration,
}

impl MixerConfig {
    pub fn profile(&self, kind: StreamKind) -> StreamProfile {
        self.profiles[kind.index()]
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            profiles: StreamKind::ALL.map(StreamProfile::for_kind),
            duck_factor: DEFAULT_DUCK_FACTOR,
            underrun_threshold: 10,
            near_empty_ms: 50,
            underrun_check_interval: Duration::from_millis(500),
            drain_chunk_ms: 20,
            idle_sleep: Duration::from_millis(2),
            join_timeout: Duration::from_secs(2),
        }
    }
}

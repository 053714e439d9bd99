//! Audio output trait abstraction

use link_protocol::AudioFormat;

use crate::{AudioResult, StreamKind};

/// Playback state reported by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Paused,
    Playing,
}

/// Platform audio output for one stream
///
/// Owned by the mixer. `write` is only called from the drain thread; the
/// other methods may be called from the ingress or application thread, never
/// concurrently with each other.
pub trait AudioSink: Send {
    /// Queue PCM for playback, returning bytes accepted
    fn write(&mut self, pcm: &[u8]) -> AudioResult<usize>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Free platform resources; the sink is dropped afterwards
    fn release(&mut self);

    /// Cumulative underruns reported by the platform
    fn underrun_count(&self) -> u64;

    fn play_state(&self) -> PlayState;

    /// Set output gain in 0.0..=1.0
    fn set_volume(&mut self, volume: f32);
}

/// Creates sinks on demand
pub trait AudioSinkFactory: Send + Sync {
    fn create(&self, format: AudioFormat, kind: StreamKind) -> AudioResult<Box<dyn AudioSink>>;
}

//! Counting stand-ins for the platform audio and video outputs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use audio_mixer::{AudioResult, AudioSink, AudioSinkFactory, PlayState, StreamKind};
use link_protocol::{AudioFormat, Message, SessionState, VideoFrameInfo};
use link_session::{SessionError, SessionEvents, SessionResult, VideoSink, WritableRegion};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct Counters {
    pub audio_bytes: AtomicU64,
    pub video_frames: AtomicU64,
    pub video_bytes: AtomicU64,
    pub messages: AtomicU64,
    pub errors: AtomicU64,
}

impl Counters {
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

pub struct CountingAudio {
    counters: Arc<Counters>,
}

impl CountingAudio {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self { counters }
    }
}

struct CountingSink {
    kind: StreamKind,
    counters: Arc<Counters>,
    state: PlayState,
    volume: f32,
}

impl AudioSink for CountingSink {
    fn write(&mut self, pcm: &[u8]) -> AudioResult<usize> {
        self.counters
            .audio_bytes
            .fetch_add(pcm.len() as u64, Ordering::Relaxed);
        Ok(pcm.len())
    }

    fn pause(&mut self) {
        self.state = PlayState::Paused;
    }

    fn resume(&mut self) {
        self.state = PlayState::Playing;
    }

    fn release(&mut self) {
        debug!(kind = %self.kind, "Audio sink released");
        self.state = PlayState::Stopped;
    }

    fn underrun_count(&self) -> u64 {
        0
    }

    fn play_state(&self) -> PlayState {
        self.state
    }

    fn set_volume(&mut self, volume: f32) {
        if (volume - self.volume).abs() > f32::EPSILON {
            debug!(kind = %self.kind, volume, "Audio sink volume");
        }
        self.volume = volume;
    }
}

impl AudioSinkFactory for CountingAudio {
    fn create(&self, format: AudioFormat, kind: StreamKind) -> AudioResult<Box<dyn AudioSink>> {
        info!("Opening {} output at {}", kind, format);
        Ok(Box::new(CountingSink {
            kind,
            counters: self.counters.clone(),
            state: PlayState::Playing,
            volume: 1.0,
        }))
    }
}

/// Video sink that recycles one buffer and counts frames
pub struct CountingVideo {
    counters: Arc<Counters>,
    spare: Mutex<Option<bytes::BytesMut>>,
}

impl CountingVideo {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            spare: Mutex::new(None),
        }
    }
}

impl VideoSink for CountingVideo {
    fn acquire_input_region(&self, min_size: usize) -> SessionResult<WritableRegion> {
        match self.spare.lock().take() {
            Some(buf) => Ok(WritableRegion::from_buffer(buf)),
            None => Ok(WritableRegion::new(min_size)),
        }
    }

    fn commit(&self, region: WritableRegion) -> SessionResult<()> {
        self.counters.video_frames.fetch_add(1, Ordering::Relaxed);
        self.counters
            .video_bytes
            .fetch_add(region.len() as u64, Ordering::Relaxed);
        *self.spare.lock() = Some(region.into_inner());
        Ok(())
    }
}

pub struct LoggingEvents {
    counters: Arc<Counters>,
}

impl LoggingEvents {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self { counters }
    }
}

impl SessionEvents for LoggingEvents {
    fn on_message(&self, message: &Message) {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);
        debug!(command = ?message.command(), "Message");
    }

    fn on_video_frame(&self, info: &VideoFrameInfo) {
        if Counters::get(&self.counters.video_frames) == 1 {
            info!("First video frame {}x{}", info.width, info.height);
        }
    }

    fn on_error(&self, error: &SessionError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        warn!("Session error: {}", error);
    }

    fn on_state_changed(&self, state: SessionState) {
        info!("Session is {}", state);
    }

    fn on_read_loop_stopped(&self) {
        debug!("Read loop stopped");
    }
}

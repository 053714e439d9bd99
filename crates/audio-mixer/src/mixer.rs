//! Stream mixer and drain loop
//!
//! Lock order inside one stream is `control` then `ring`. The ingress thread
//! takes only the `ring` lock on the hot path, so a sink write in progress on
//! the drain thread never stalls PCM ingestion. No code path holds locks of
//! two different streams at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use link_protocol::AudioFormat;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{
    AudioError, AudioResult, AudioSink, AudioSinkFactory, MixerConfig, RingBuffer, RingStats,
    StreamKind, StreamProfile, TRIVIAL_FILL_MS,
};

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Held back by the minimum hold; the drain loop completes it later
    Deferred,
    NotActive,
}

/// Snapshot of one stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamStats {
    pub kind: StreamKind,
    pub format: Option<AudioFormat>,
    pub live: bool,
    /// Pre-fill satisfied, draining into the sink
    pub started: bool,
    pub pending_stop: bool,
    pub volume: f32,
    pub fill_ms: u64,
    pub ring: RingStats,
    pub underrun_recoveries: u64,
    pub sink_creations: u64,
    pub deferred_stops: u64,
    pub sink_errors: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixerStats {
    pub streams: Vec<StreamStats>,
    pub duck_factor: f32,
}

struct StreamControl {
    sink: Option<Box<dyn AudioSink>>,
    format: Option<AudioFormat>,
    started: bool,
    live: bool,
    /// Explicitly started and not yet stopped
    requested: bool,
    pending_stop: bool,
    start_time: Option<Instant>,
    volume: f32,
    last_underrun_count: u64,
    last_underrun_check: Option<Instant>,
    underrun_recoveries: u64,
    sink_creations: u64,
    deferred_stops: u64,
    sink_errors: u64,
}

impl StreamControl {
    fn new() -> Self {
        Self {
            sink: None,
            format: None,
            started: false,
            live: false,
            requested: false,
            pending_stop: false,
            start_time: None,
            volume: 1.0,
            last_underrun_count: 0,
            last_underrun_check: None,
            underrun_recoveries: 0,
            sink_creations: 0,
            deferred_stops: 0,
            sink_errors: 0,
        }
    }
}

struct RingSlot {
    buffer: Option<RingBuffer>,
    /// Producer may append without consulting `control`
    live: bool,
}

impl RingSlot {
    fn fill_ms(&self) -> u64 {
        self.buffer.as_ref().map_or(0, RingBuffer::fill_level_ms)
    }
}

struct StreamSlot {
    kind: StreamKind,
    profile: StreamProfile,
    control: Mutex<StreamControl>,
    ring: Mutex<RingSlot>,
}

impl StreamSlot {
    fn new(kind: StreamKind, profile: StreamProfile) -> Self {
        Self {
            kind,
            profile,
            control: Mutex::new(StreamControl::new()),
            ring: Mutex::new(RingSlot {
                buffer: None,
                live: false,
            }),
        }
    }
}

struct MixerShared {
    config: MixerConfig,
    factory: Arc<dyn AudioSinkFactory>,
    streams: [StreamSlot; 4],
    duck: Mutex<f32>,
    running: AtomicBool,
    scratch: Mutex<Vec<u8>>,
}

struct DrainThread {
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
}

/// Per-stream ring buffers and sinks with a shared drain loop
pub struct AudioMixer {
    shared: Arc<MixerShared>,
    drain: Mutex<Option<DrainThread>>,
}

impl AudioMixer {
    pub fn new(factory: Arc<dyn AudioSinkFactory>, config: MixerConfig) -> Self {
        let streams = StreamKind::ALL.map(|kind| StreamSlot::new(kind, config.profile(kind)));
        Self {
            shared: Arc::new(MixerShared {
                config,
                factory,
                streams,
                duck: Mutex::new(1.0),
                running: AtomicBool::new(false),
                scratch: Mutex::new(Vec::new()),
            }),
            drain: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.shared.config
    }

    /// Queue PCM for `kind`
    ///
    /// Creates the sink on first data and recreates it on a format change.
    /// Never blocks on the sink; audio that does not fit is dropped.
    pub fn write(&self, kind: StreamKind, format: AudioFormat, pcm: &[u8]) -> AudioResult<usize> {
        self.write_at(kind, format, pcm, Instant::now())
    }

    pub fn write_at(
        &self,
        kind: StreamKind,
        format: AudioFormat,
        pcm: &[u8],
        now: Instant,
    ) -> AudioResult<usize> {
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(AudioError::InvalidFormat(format.to_string()));
        }

        let slot = self.shared.slot(kind);
        {
            let mut ring = slot.ring.lock();
            if ring.live {
                if let Some(buffer) = ring.buffer.as_mut().filter(|b| b.format() == format) {
                    return Ok(append(kind, buffer, pcm));
                }
            }
        }

        self.shared.activate(slot, format, now)?;

        let mut ring = slot.ring.lock();
        Ok(ring
            .buffer
            .as_mut()
            .map_or(0, |buffer| append(kind, buffer, pcm)))
    }

    pub fn start_stream(&self, kind: StreamKind) {
        self.start_stream_at(kind, Instant::now());
    }

    /// Mark `kind` as started by the adapter
    ///
    /// Resumes a paused sink and ducks media for navigation and voice.
    pub fn start_stream_at(&self, kind: StreamKind, now: Instant) {
        let slot = self.shared.slot(kind);
        {
            let mut control = slot.control.lock();
            control.requested = true;
            control.pending_stop = false;
            control.start_time = Some(now);
            if !control.live && control.sink.is_some() {
                self.shared.resume_locked(slot, &mut control, now);
            }
        }
        debug!(stream = %kind, "Stream start");

        if kind.ducks_media() {
            self.shared.update_ducking();
        }
    }

    pub fn stop_stream(&self, kind: StreamKind) -> StopOutcome {
        self.stop_stream_at(kind, Instant::now())
    }

    /// Stop `kind`, honouring the stream's minimum hold
    pub fn stop_stream_at(&self, kind: StreamKind, now: Instant) -> StopOutcome {
        let slot = self.shared.slot(kind);
        let outcome = {
            let mut control = slot.control.lock();
            if !control.live && !control.requested {
                StopOutcome::NotActive
            } else {
                let fill_ms = slot.ring.lock().fill_ms();
                let held = control
                    .start_time
                    .map_or(Duration::MAX, |t| now.saturating_duration_since(t));

                match slot.profile.min_hold {
                    Some(hold) if control.live && held < hold && fill_ms > TRIVIAL_FILL_MS => {
                        control.pending_stop = true;
                        control.deferred_stops += 1;
                        warn!(
                            stream = %kind,
                            held_ms = held.as_millis() as u64,
                            fill_ms,
                            "Stop ignored inside minimum hold, deferring"
                        );
                        StopOutcome::Deferred
                    }
                    _ => {
                        self.shared.stop_locked(slot, &mut control);
                        StopOutcome::Stopped
                    }
                }
            }
        };

        if outcome == StopOutcome::Stopped && kind.ducks_media() {
            self.shared.update_ducking();
        }
        outcome
    }

    /// Set the user volume of `kind` in 0.0..=1.0
    pub fn set_volume(&self, kind: StreamKind, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        let slot = self.shared.slot(kind);
        let mut control = slot.control.lock();
        control.volume = volume;
        let effective = self.shared.effective_volume(kind, volume);
        if let Some(sink) = control.sink.as_mut() {
            sink.set_volume(effective);
        }
    }

    /// Current media duck factor (1.0 when not ducked)
    pub fn duck_factor(&self) -> f32 {
        *self.shared.duck.lock()
    }

    /// One pass over every stream; returns whether any audio was moved
    pub fn drain_once(&self, now: Instant) -> bool {
        self.shared.drain_once(now)
    }

    /// Spawn the drain thread
    pub fn start_drain(&self) -> AudioResult<()> {
        let mut drain = self.drain.lock();
        if drain.is_some() {
            return Ok(());
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let (done_tx, done_rx) = bounded(1);

        let handle = std::thread::Builder::new()
            .name("audio-drain".into())
            .spawn(move || {
                debug!("Audio drain loop started");
                while shared.running.load(Ordering::SeqCst) {
                    if !shared.drain_once(Instant::now()) {
                        std::thread::sleep(shared.config.idle_sleep);
                    }
                }
                debug!("Audio drain loop ended");
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                AudioError::Sink(format!("failed to spawn drain thread: {e}"))
            })?;

        *drain = Some(DrainThread { handle, done_rx });
        info!("Audio drain thread started");
        Ok(())
    }

    pub fn is_draining(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stop the drain thread, waiting at most the configured join timeout
    pub fn stop_drain(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let Some(drain) = self.drain.lock().take() else {
            return;
        };

        match drain.done_rx.recv_timeout(self.shared.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if drain.handle.join().is_err() {
                    warn!("Audio drain thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.shared.config.join_timeout.as_millis() as u64,
                    "Audio drain thread did not stop in time, detaching"
                );
            }
        }
    }

    /// Stop draining and release every sink and ring buffer
    pub fn teardown(&self) {
        self.stop_drain();

        let mut released = 0;
        for slot in &self.shared.streams {
            let mut control = slot.control.lock();
            if let Some(mut sink) = control.sink.take() {
                sink.release();
                released += 1;
            }
            let volume = control.volume;
            *control = StreamControl::new();
            control.volume = volume;

            let mut ring = slot.ring.lock();
            ring.buffer = None;
            ring.live = false;
        }
        *self.shared.duck.lock() = 1.0;

        info!(released, "Audio mixer torn down");
    }

    pub fn is_live(&self, kind: StreamKind) -> bool {
        self.shared.slot(kind).control.lock().live
    }

    /// Check whether `kind` has satisfied pre-fill and is draining
    pub fn is_started(&self, kind: StreamKind) -> bool {
        self.shared.slot(kind).control.lock().started
    }

    pub fn stream_stats(&self, kind: StreamKind) -> StreamStats {
        let slot = self.shared.slot(kind);
        let control = slot.control.lock();
        let ring = slot.ring.lock();
        StreamStats {
            kind,
            format: control.format,
            live: control.live,
            started: control.started,
            pending_stop: control.pending_stop,
            volume: control.volume,
            fill_ms: ring.fill_ms(),
            ring: ring
                .buffer
                .as_ref()
                .map(RingBuffer::stats)
                .unwrap_or_default(),
            underrun_recoveries: control.underrun_recoveries,
            sink_creations: control.sink_creations,
            deferred_stops: control.deferred_stops,
            sink_errors: control.sink_errors,
        }
    }

    pub fn stats(&self) -> MixerStats {
        MixerStats {
            streams: StreamKind::ALL
                .iter()
                .map(|kind| self.stream_stats(*kind))
                .collect(),
            duck_factor: self.duck_factor(),
        }
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.stop_drain();
    }
}

fn append(kind: StreamKind, buffer: &mut RingBuffer, pcm: &[u8]) -> usize {
    let written = buffer.write(pcm);
    if written < pcm.len() {
        trace!(
            stream = %kind,
            dropped = pcm.len() - written,
            "Ring buffer full, dropping audio"
        );
    }
    written
}

impl MixerShared {
    fn slot(&self, kind: StreamKind) -> &StreamSlot {
        &self.streams[kind.index()]
    }

    fn effective_volume(&self, kind: StreamKind, volume: f32) -> f32 {
        if kind == StreamKind::Media {
            volume * *self.duck.lock()
        } else {
            volume
        }
    }

    /// Make the stream live for `format`, creating or resuming its sink
    fn activate(&self, slot: &StreamSlot, format: AudioFormat, now: Instant) -> AudioResult<()> {
        let mut control = slot.control.lock();

        if control.format == Some(format) && control.sink.is_some() {
            if !control.live {
                self.resume_locked(slot, &mut control, now);
            }
            return Ok(());
        }

        if let Some(mut old) = control.sink.take() {
            info!(
                stream = %slot.kind,
                from = ?control.format,
                to = %format,
                "Audio format changed, recreating sink"
            );
            old.release();
        }
        control.format = None;
        control.started = false;
        control.live = false;
        {
            let mut ring = slot.ring.lock();
            ring.buffer = None;
            ring.live = false;
        }

        let mut sink = self.factory.create(format, slot.kind)?;
        sink.set_volume(self.effective_volume(slot.kind, control.volume));

        control.sink = Some(sink);
        control.format = Some(format);
        control.live = true;
        control.start_time = Some(now);
        control.last_underrun_count = 0;
        control.last_underrun_check = None;
        control.sink_creations += 1;

        let mut ring = slot.ring.lock();
        ring.buffer = Some(RingBuffer::with_duration(format, slot.profile.ring_ms));
        ring.live = true;

        debug!(
            stream = %slot.kind,
            format = %format,
            ring_ms = slot.profile.ring_ms,
            "Audio stream created"
        );
        Ok(())
    }

    /// Same-format restart: resume the sink and re-arm pre-fill
    fn resume_locked(&self, slot: &StreamSlot, control: &mut StreamControl, now: Instant) {
        if let Some(sink) = control.sink.as_mut() {
            sink.resume();
        }
        control.started = false;
        control.live = true;
        control.pending_stop = false;
        control.start_time = Some(now);
        control.last_underrun_check = None;
        if let Some(sink) = control.sink.as_ref() {
            control.last_underrun_count = sink.underrun_count();
        }

        let mut ring = slot.ring.lock();
        if let Some(buffer) = ring.buffer.as_mut() {
            buffer.clear();
        }
        ring.live = true;

        debug!(stream = %slot.kind, "Audio stream resumed");
    }

    fn stop_locked(&self, slot: &StreamSlot, control: &mut StreamControl) {
        if let Some(sink) = control.sink.as_mut() {
            sink.pause();
        }
        control.started = false;
        control.live = false;
        control.requested = false;
        control.pending_stop = false;

        let mut ring = slot.ring.lock();
        if let Some(buffer) = ring.buffer.as_mut() {
            buffer.clear();
        }
        ring.live = false;

        debug!(stream = %slot.kind, "Audio stream stopped");
    }

    /// Duck media while navigation or voice is requested
    fn update_ducking(&self) {
        let ducked = self
            .streams
            .iter()
            .filter(|slot| slot.kind.ducks_media())
            .any(|slot| slot.control.lock().requested);
        let factor = if ducked { self.config.duck_factor } else { 1.0 };

        {
            let mut duck = self.duck.lock();
            if *duck == factor {
                return;
            }
            *duck = factor;
        }

        let media = self.slot(StreamKind::Media);
        let mut control = media.control.lock();
        let effective = control.volume * factor;
        if let Some(sink) = control.sink.as_mut() {
            sink.set_volume(effective);
        }
        info!(factor, "Media ducking changed");
    }

    fn check_underruns(&self, slot: &StreamSlot, control: &mut StreamControl, now: Instant) {
        control.last_underrun_check = Some(now);
        let current = control.sink.as_ref().map_or(0, |sink| sink.underrun_count());
        let delta = current.saturating_sub(control.last_underrun_count);
        control.last_underrun_count = current;

        if !control.started || delta < self.config.underrun_threshold {
            return;
        }

        let fill_ms = slot.ring.lock().fill_ms();
        if fill_ms < self.config.near_empty_ms {
            control.started = false;
            control.underrun_recoveries += 1;
            warn!(
                stream = %slot.kind,
                underruns = delta,
                fill_ms,
                "Sink underrunning with near-empty buffer, re-buffering"
            );
        }
    }

    fn drain_once(&self, now: Instant) -> bool {
        let mut did_work = false;
        let mut ducking_changed = false;
        let mut scratch = self.scratch.lock();

        for slot in &self.streams {
            let mut control = slot.control.lock();
            if !control.live || control.sink.is_none() {
                continue;
            }
            let Some(format) = control.format else {
                continue;
            };

            if control.pending_stop {
                let elapsed = control
                    .start_time
                    .map_or(Duration::MAX, |t| now.saturating_duration_since(t));
                let hold = slot.profile.min_hold.unwrap_or(Duration::ZERO);
                let drained = slot.ring.lock().fill_ms() <= TRIVIAL_FILL_MS;
                // a held prompt plays out its tail; a full ring past the hold bounds it
                let overdue = elapsed >= hold + Duration::from_millis(slot.profile.ring_ms);

                if drained || overdue {
                    self.stop_locked(slot, &mut control);
                    debug!(stream = %slot.kind, "Deferred stop completed");
                    ducking_changed |= slot.kind.ducks_media();
                    continue;
                }
            }

            let check_due = control.last_underrun_check.is_none_or(|last| {
                now.saturating_duration_since(last) >= self.config.underrun_check_interval
            });
            if check_due {
                self.check_underruns(slot, &mut control, now);
            }

            if !control.started {
                let fill_ms = slot.ring.lock().fill_ms();
                // a deferred stop means no more audio is coming, so play what is there
                if fill_ms < slot.profile.prefill_ms && !control.pending_stop {
                    continue;
                }
                control.started = true;
                debug!(stream = %slot.kind, fill_ms, "Pre-fill satisfied, starting playback");
            }

            let want = format
                .bytes_for_ms(self.config.drain_chunk_ms)
                .max(format.frame_bytes());
            if scratch.len() < want {
                scratch.resize(want, 0);
            }

            let read = {
                let mut ring = slot.ring.lock();
                match ring.buffer.as_mut() {
                    Some(buffer) => buffer.read(&mut scratch[..want]),
                    None => 0,
                }
            };
            if read == 0 {
                continue;
            }

            let result = match control.sink.as_mut() {
                Some(sink) => sink.write(&scratch[..read]),
                None => continue,
            };
            match result {
                Ok(_) => did_work = true,
                Err(e) => {
                    control.sink_errors += 1;
                    warn!(stream = %slot.kind, "Audio sink write failed: {}", e);
                }
            }
        }

        drop(scratch);
        if ducking_changed {
            self.update_ducking();
        }
        did_work
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlayState;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct SinkProbe {
        bytes: AtomicU64,
        underruns: AtomicU64,
        pauses: AtomicU64,
        resumes: AtomicU64,
        released: AtomicBool,
        volume: Mutex<f32>,
    }

    struct MockSink {
        probe: Arc<SinkProbe>,
        state: PlayState,
    }

    impl AudioSink for MockSink {
        fn write(&mut self, pcm: &[u8]) -> AudioResult<usize> {
            self.state = PlayState::Playing;
            self.probe.bytes.fetch_add(pcm.len() as u64, Ordering::SeqCst);
            Ok(pcm.len())
        }

        fn pause(&mut self) {
            self.state = PlayState::Paused;
            self.probe.pauses.fetch_add(1, Ordering::SeqCst);
        }

        fn resume(&mut self) {
            self.state = PlayState::Playing;
            self.probe.resumes.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&mut self) {
            self.state = PlayState::Stopped;
            self.probe.released.store(true, Ordering::SeqCst);
        }

        fn underrun_count(&self) -> u64 {
            self.probe.underruns.load(Ordering::SeqCst)
        }

        fn play_state(&self) -> PlayState {
            self.state
        }

        fn set_volume(&mut self, volume: f32) {
            *self.probe.volume.lock() = volume;
        }
    }

    #[derive(Default)]
    struct MockFactory {
        created: Mutex<Vec<(StreamKind, AudioFormat, Arc<SinkProbe>)>>,
    }

    impl MockFactory {
        fn probe(&self, kind: StreamKind) -> Arc<SinkProbe> {
            self.created
                .lock()
                .iter()
                .rev()
                .find(|(k, _, _)| *k == kind)
                .map(|(_, _, probe)| probe.clone())
                .unwrap()
        }

        fn count(&self, kind: StreamKind) -> usize {
            self.created.lock().iter().filter(|(k, _, _)| *k == kind).count()
        }
    }

    impl AudioSinkFactory for MockFactory {
        fn create(&self, format: AudioFormat, kind: StreamKind) -> AudioResult<Box<dyn AudioSink>> {
            let probe = Arc::new(SinkProbe::default());
            self.created.lock().push((kind, format, probe.clone()));
            Ok(Box::new(MockSink {
                probe,
                state: PlayState::Stopped,
            }))
        }
    }

    fn mixer() -> (AudioMixer, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::default());
        let mixer = AudioMixer::new(factory.clone(), MixerConfig::default());
        (mixer, factory)
    }

    fn pcm(format: AudioFormat, ms: u64) -> Vec<u8> {
        vec![1u8; format.bytes_for_ms(ms)]
    }

    const CD: AudioFormat = AudioFormat::new(44_100, 2);
    const NAV: AudioFormat = AudioFormat::new(16_000, 1);

    #[test]
    fn test_prefill_gates_playback() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 100), t0).unwrap();
        assert!(!mixer.drain_once(t0));
        let probe = factory.probe(StreamKind::Media);
        assert_eq!(probe.bytes.load(Ordering::SeqCst), 0);
        assert!(!mixer.is_started(StreamKind::Media));

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 60), t0).unwrap();
        assert!(mixer.drain_once(t0));
        assert!(mixer.is_started(StreamKind::Media));
        assert_eq!(probe.bytes.load(Ordering::SeqCst), CD.bytes_for_ms(20) as u64);
    }

    #[test]
    fn test_underrun_recovery_resets_prefill() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 200), t0).unwrap();
        // Drain 160ms, leaving 40ms buffered
        for _ in 0..8 {
            assert!(mixer.drain_once(t0));
        }
        assert!(mixer.is_started(StreamKind::Media));
        assert!(mixer.stream_stats(StreamKind::Media).fill_ms < 50);

        let probe = factory.probe(StreamKind::Media);
        let before = probe.bytes.load(Ordering::SeqCst);
        probe.underruns.store(12, Ordering::SeqCst);

        let later = t0 + Duration::from_millis(600);
        assert!(!mixer.drain_once(later));
        assert!(!mixer.is_started(StreamKind::Media));
        assert_eq!(probe.bytes.load(Ordering::SeqCst), before);
        assert_eq!(mixer.stream_stats(StreamKind::Media).underrun_recoveries, 1);

        // Needs a full pre-fill again before the next sink write
        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 150), later).unwrap();
        assert!(mixer.drain_once(later));
        assert!(probe.bytes.load(Ordering::SeqCst) > before);
    }

    #[test]
    fn test_underruns_below_threshold_ignored() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 160), t0).unwrap();
        mixer.drain_once(t0);
        factory.probe(StreamKind::Media).underruns.store(9, Ordering::SeqCst);

        mixer.drain_once(t0 + Duration::from_millis(600));
        assert!(mixer.is_started(StreamKind::Media));
    }

    #[test]
    fn test_navigation_ducks_media() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 20), t0).unwrap();
        let media = factory.probe(StreamKind::Media);
        assert_eq!(*media.volume.lock(), 1.0);

        mixer.start_stream_at(StreamKind::Navigation, t0);
        assert_eq!(*media.volume.lock(), 0.2);
        assert_eq!(mixer.duck_factor(), 0.2);

        mixer.set_volume(StreamKind::Media, 0.5);
        assert_eq!(*media.volume.lock(), 0.1);

        assert_eq!(
            mixer.stop_stream_at(StreamKind::Navigation, t0 + Duration::from_secs(1)),
            StopOutcome::Stopped
        );
        assert_eq!(*media.volume.lock(), 0.5);
        assert_eq!(mixer.duck_factor(), 1.0);
    }

    #[test]
    fn test_minimum_hold_defers_stop() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        mixer.start_stream_at(StreamKind::Navigation, t0);
        mixer.write_at(StreamKind::Navigation, NAV, &pcm(NAV, 100), t0).unwrap();

        let outcome = mixer.stop_stream_at(StreamKind::Navigation, t0 + Duration::from_millis(100));
        assert_eq!(outcome, StopOutcome::Deferred);
        assert!(mixer.is_live(StreamKind::Navigation));
        assert_eq!(mixer.duck_factor(), 0.2);

        // Still inside the hold with audio left: keeps playing
        assert!(mixer.drain_once(t0 + Duration::from_millis(150)));
        assert!(mixer.is_live(StreamKind::Navigation));

        // Past the hold the buffered tail still plays out before the stop lands
        let later = t0 + Duration::from_millis(400);
        for _ in 0..10 {
            if !mixer.is_live(StreamKind::Navigation) {
                break;
            }
            mixer.drain_once(later);
        }
        assert!(!mixer.is_live(StreamKind::Navigation));
        assert_eq!(mixer.duck_factor(), 1.0);
        let probe = factory.probe(StreamKind::Navigation);
        assert_eq!(probe.pauses.load(Ordering::SeqCst), 1);
        assert_eq!(probe.bytes.load(Ordering::SeqCst), NAV.bytes_for_ms(100) as u64);
    }

    #[test]
    fn test_short_prompt_plays_before_deferred_stop() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        // Shorter than the navigation pre-fill
        mixer.start_stream_at(StreamKind::Navigation, t0);
        mixer.write_at(StreamKind::Navigation, NAV, &pcm(NAV, 60), t0).unwrap();
        assert!(!mixer.drain_once(t0 + Duration::from_millis(30)));

        let stop_at = t0 + Duration::from_millis(60);
        assert_eq!(
            mixer.stop_stream_at(StreamKind::Navigation, stop_at),
            StopOutcome::Deferred
        );

        for step in 1..=100u64 {
            mixer.drain_once(stop_at + Duration::from_millis(step * 5));
        }

        let probe = factory.probe(StreamKind::Navigation);
        assert_eq!(probe.bytes.load(Ordering::SeqCst), NAV.bytes_for_ms(60) as u64);
        assert!(!mixer.is_live(StreamKind::Navigation));
        assert_eq!(mixer.duck_factor(), 1.0);
    }

    #[test]
    fn test_deferred_stop_bounded_when_audio_keeps_coming() {
        let (mixer, _factory) = mixer();
        let t0 = Instant::now();

        mixer.start_stream_at(StreamKind::Voice, t0);
        mixer.write_at(StreamKind::Voice, NAV, &pcm(NAV, 100), t0).unwrap();
        assert_eq!(
            mixer.stop_stream_at(StreamKind::Voice, t0 + Duration::from_millis(50)),
            StopOutcome::Deferred
        );

        // Keep the ring topped up: only the hold plus one ring length ends it
        let mut now = t0 + Duration::from_millis(50);
        while now < t0 + Duration::from_millis(380) {
            mixer.write_at(StreamKind::Voice, NAV, &pcm(NAV, 20), now).unwrap();
            mixer.drain_once(now);
            assert!(mixer.is_live(StreamKind::Voice));
            now += Duration::from_millis(20);
        }

        mixer.drain_once(t0 + Duration::from_millis(400));
        assert!(!mixer.is_live(StreamKind::Voice));
    }

    #[test]
    fn test_stop_with_empty_buffer_is_immediate() {
        let (mixer, _factory) = mixer();
        let t0 = Instant::now();

        mixer.start_stream_at(StreamKind::Voice, t0);
        mixer.write_at(StreamKind::Voice, NAV, &pcm(NAV, 5), t0).unwrap();
        assert_eq!(
            mixer.stop_stream_at(StreamKind::Voice, t0 + Duration::from_millis(10)),
            StopOutcome::Stopped
        );
        assert_eq!(
            mixer.stop_stream_at(StreamKind::Voice, t0 + Duration::from_millis(20)),
            StopOutcome::NotActive
        );
    }

    #[test]
    fn test_format_change_recreates_sink() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 20), t0).unwrap();
        let first = factory.probe(StreamKind::Media);

        let hi_res = AudioFormat::new(48_000, 2);
        mixer.write_at(StreamKind::Media, hi_res, &pcm(hi_res, 20), t0).unwrap();
        assert_eq!(factory.count(StreamKind::Media), 2);
        assert!(first.released.load(Ordering::SeqCst));

        let stats = mixer.stream_stats(StreamKind::Media);
        assert_eq!(stats.format, Some(hi_res));
        assert_eq!(stats.ring.capacity, hi_res.bytes_for_ms(500));
        assert_eq!(stats.fill_ms, 20);
    }

    #[test]
    fn test_same_format_resume_reuses_sink() {
        let (mixer, factory) = mixer();
        let t0 = Instant::now();

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 200), t0).unwrap();
        mixer.drain_once(t0);
        assert!(mixer.is_started(StreamKind::Media));
        assert_eq!(mixer.stop_stream_at(StreamKind::Media, t0), StopOutcome::Stopped);

        mixer.write_at(StreamKind::Media, CD, &pcm(CD, 20), t0).unwrap();
        assert_eq!(factory.count(StreamKind::Media), 1);
        let probe = factory.probe(StreamKind::Media);
        assert_eq!(probe.resumes.load(Ordering::SeqCst), 1);
        assert!(!mixer.is_started(StreamKind::Media));
        // Stale audio from before the stop is gone
        assert_eq!(mixer.stream_stats(StreamKind::Media).fill_ms, 20);
    }

    #[test]
    fn test_overflow_drops_tail() {
        let (mixer, _factory) = mixer();
        let written = mixer.write(StreamKind::Call, NAV, &pcm(NAV, 300)).unwrap();
        assert_eq!(written, NAV.bytes_for_ms(160));
        assert_eq!(mixer.stream_stats(StreamKind::Call).ring.overflow_count, 1);
    }

    #[test]
    fn test_invalid_format_rejected() {
        let (mixer, _factory) = mixer();
        let result = mixer.write(StreamKind::Media, AudioFormat::new(0, 2), &[0; 4]);
        assert!(matches!(result, Err(AudioError::InvalidFormat(_))));
    }

    #[test]
    fn test_drain_thread_and_teardown() {
        let (mixer, factory) = mixer();
        mixer.start_drain().unwrap();
        assert!(mixer.is_draining());

        mixer.write(StreamKind::Media, CD, &pcm(CD, 300)).unwrap();
        let probe = factory.probe(StreamKind::Media);

        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.bytes.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(probe.bytes.load(Ordering::SeqCst) > 0);

        mixer.teardown();
        assert!(!mixer.is_draining());
        assert!(probe.released.load(Ordering::SeqCst));
        assert!(!mixer.is_live(StreamKind::Media));
    }
}

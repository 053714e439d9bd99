//! Session controller
//!
//! Owns the session lifecycle. Three threads run while streaming: the
//! heartbeat timer (`link-timer`), the ingress loop (`link-ingress`) and the
//! mixer drain loop (`audio-drain`). Outbound writes from any thread are
//! serialized so frames never interleave on the wire.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use audio_mixer::{
    AudioMixer, AudioSinkFactory, MixerConfig, MixerStats, StreamAction, StreamRouter,
};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use frame_pool::{BufferPool, PoolStats};
use link_protocol::{
    AudioBody, AudioData, DongleConfig, HEADER_SIZE, Message, MessageHeader, ProtocolError,
    SessionState, VideoFrameInfo,
};
use link_transport::{Transport, TransportError, TransportResult};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::{
    HeartbeatPolicy, HeartbeatSchedule, HeartbeatTick, IngressHandler, IngressRouter,
    LivenessFailure, LivenessWatchdog, RouterStats, SessionError, SessionEvents, SessionOptions,
    SessionResult, VideoSink, connect_message, init_sequence, unix_time_now,
};

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub heartbeats_sent: u64,
    pub heartbeats_failed: u64,
    /// Heartbeats that found the timer already behind schedule
    pub heartbeats_late: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub send_failures: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub decode_errors: u64,
    pub audio_errors: u64,
    pub video_frames: u64,
    pub liveness_failures: u64,
}

/// Host side of one adapter session
///
/// A controller runs at most once: after `stop()` (or a liveness failure)
/// it stays `Disconnected` and a new controller is needed to reconnect.
pub struct SessionController {
    shared: Arc<SessionShared>,
    workers: Mutex<Workers>,
}

struct SessionShared {
    transport: Arc<dyn Transport>,
    video: Arc<dyn VideoSink>,
    events: Arc<dyn SessionEvents>,
    mixer: AudioMixer,
    pool: Arc<BufferPool>,
    options: SessionOptions,
    state: RwLock<SessionState>,
    stats: RwLock<SessionStats>,
    running: Arc<AtomicBool>,
    write_lock: Mutex<()>,
    watchdog: Mutex<LivenessWatchdog>,
    audio_routing: Mutex<StreamRouter>,
    /// When `wifiConnect` is due; cleared once sent
    connect_at: Mutex<Option<Instant>>,
    router_stats: Mutex<Option<Arc<Mutex<RouterStats>>>>,
    /// State changes not yet handed to `events`
    state_events: Mutex<Vec<SessionState>>,
}

#[derive(Default)]
struct Workers {
    timer: Option<Worker>,
    reader: Option<Worker>,
    released: bool,
}

struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    done_rx: Receiver<()>,
    stop_tx: Option<Sender<()>>,
}

impl Worker {
    fn spawn(
        name: &'static str,
        stop_tx: Option<Sender<()>>,
        body: impl FnOnce() + Send + 'static,
    ) -> SessionResult<Self> {
        let (done_tx, done_rx) = bounded(1);
        let handle = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                body();
                let _ = done_tx.send(());
            })
            .map_err(|e| SessionError::ResourceExhausted(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            handle,
            done_rx,
            stop_tx,
        })
    }

    /// Signal the worker and wait up to `timeout`; detach it if it hangs
    fn join(mut self, timeout: Duration) {
        drop(self.stop_tx.take());
        if self.handle.thread().id() == std::thread::current().id() {
            // stopped from one of this worker's own callbacks
            debug!("Thread {} exits on its own", self.name);
            return;
        }
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!("Thread {} panicked", self.name);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Thread {} did not stop in time, detaching", self.name
                );
            }
        }
    }
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn Transport>,
        audio: Arc<dyn AudioSinkFactory>,
        video: Arc<dyn VideoSink>,
        events: Arc<dyn SessionEvents>,
        options: SessionOptions,
    ) -> Self {
        Self::with_mixer_config(transport, audio, video, events, options, MixerConfig::default())
    }

    pub fn with_mixer_config(
        transport: Arc<dyn Transport>,
        audio: Arc<dyn AudioSinkFactory>,
        video: Arc<dyn VideoSink>,
        events: Arc<dyn SessionEvents>,
        options: SessionOptions,
        mixer_config: MixerConfig,
    ) -> Self {
        let now = Instant::now();
        let watchdog = LivenessWatchdog::new(
            now,
            options.heartbeat_interval,
            options.liveness_grace(),
            options.max_heartbeat_failures,
        );

        Self {
            shared: Arc::new(SessionShared {
                transport,
                video,
                events,
                mixer: AudioMixer::new(audio, mixer_config),
                pool: Arc::new(BufferPool::new()),
                options,
                state: RwLock::new(SessionState::Idle),
                stats: RwLock::new(SessionStats::default()),
                running: Arc::new(AtomicBool::new(false)),
                write_lock: Mutex::new(()),
                watchdog: Mutex::new(watchdog),
                audio_routing: Mutex::new(StreamRouter::new()),
                connect_at: Mutex::new(None),
                router_stats: Mutex::new(None),
                state_events: Mutex::new(Vec::new()),
            }),
            workers: Mutex::new(Workers::default()),
        }
    }

    /// Open the session: heartbeat, init sequence, then the ingress loop
    ///
    /// Returns once the init sequence has been written and the session is
    /// `Streaming`. Individual init writes that fail are logged and counted;
    /// the watchdog decides whether the adapter is still there.
    ///
    /// State notifications are delivered after the controller lock is
    /// released, so `SessionEvents` callbacks may call back into it.
    pub fn start(&self, config: DongleConfig) -> SessionResult<()> {
        let result = {
            let mut workers = self.workers.lock();
            self.start_locked(&mut workers, config)
        };
        self.shared.deliver_state_events();
        result
    }

    fn start_locked(&self, workers: &mut Workers, config: DongleConfig) -> SessionResult<()> {
        if self.state() != SessionState::Idle {
            return Err(SessionError::AlreadyStarted);
        }

        // built up front so a bad config never leaves a half-started session
        let init = init_sequence(&config, unix_time_now())?;

        if let Err(e) = self.start_inner(workers, &config, &init) {
            error!("Session start failed: {}", e);
            self.shutdown(workers);
            return Err(e);
        }
        Ok(())
    }

    fn start_inner(
        &self,
        workers: &mut Workers,
        config: &DongleConfig,
        init: &[Message],
    ) -> SessionResult<()> {
        let shared = &self.shared;
        shared.transition(SessionState::Connecting)?;
        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Starting adapter session"
        );

        if !shared.transport.is_open() {
            return Err(TransportError::ConnectionClosed.into());
        }

        shared.running.store(true, Ordering::SeqCst);
        shared.pool.configure(config.width, config.height);

        let now = Instant::now();
        shared.watchdog.lock().reset(now);
        // heartbeat 0 goes out under either policy to keep the firmware up during init
        let mut schedule = HeartbeatSchedule::new(now, shared.options.heartbeat_interval);
        let tick = schedule.advance(now);
        shared.heartbeat(now, Some(tick));

        shared.transition(SessionState::Initializing)?;
        shared.mixer.start_drain()?;

        // a message wakes the timer to reschedule, disconnection stops it
        let (wake_tx, wake_rx) = bounded(1);
        let timer_shared = Arc::clone(shared);
        workers.timer = Some(Worker::spawn("link-timer", Some(wake_tx.clone()), move || {
            timer_shared.run_timer(schedule, wake_rx);
        })?);

        for message in init {
            shared.send(message);
        }
        *shared.connect_at.lock() = Some(Instant::now() + shared.options.connect_delay);
        let _ = wake_tx.try_send(());
        drop(wake_tx);
        debug!(count = init.len(), "Init sequence sent");

        let router = IngressRouter::new(
            Arc::clone(&shared.transport),
            Arc::clone(&shared.pool),
            Arc::clone(&shared.video),
            Arc::clone(shared) as Arc<dyn IngressHandler>,
            shared.options.clone(),
            Arc::clone(&shared.running),
        );
        *shared.router_stats.lock() = Some(router.stats_handle());
        workers.reader = Some(Worker::spawn("link-ingress", None, move || router.run())?);

        shared.transition(SessionState::Streaming)?;
        Ok(())
    }

    /// Stop the session and release every resource
    ///
    /// Safe to call after a liveness failure; that path only flips the state
    /// and leaves thread and device cleanup to this call.
    pub fn stop(&self) -> SessionResult<()> {
        let result = {
            let mut workers = self.workers.lock();
            if self.state() == SessionState::Idle {
                Err(SessionError::NotRunning)
            } else {
                if !workers.released {
                    self.shutdown(&mut workers);
                }
                Ok(())
            }
        };
        self.shared.deliver_state_events();
        result
    }

    fn shutdown(&self, workers: &mut Workers) {
        let shared = &self.shared;
        let timeout = shared.options.join_timeout;
        shared.running.store(false, Ordering::SeqCst);

        if let Some(reader) = workers.reader.take() {
            reader.join(timeout);
        }
        shared.mixer.stop_drain();

        // heartbeats must stop before the transport goes away
        if let Some(timer) = workers.timer.take() {
            timer.join(timeout);
        }
        shared.transport.close();

        shared.mixer.teardown();
        shared.pool.reset();
        *shared.connect_at.lock() = None;
        workers.released = true;

        if let Err(e) = shared.transition(SessionState::Disconnected) {
            debug!("Skipping state change on shutdown: {}", e);
        }
        info!(stats = ?self.stats(), "Session stopped");
    }

    /// Send one message; returns false if it was not written
    pub fn send(&self, message: &Message) -> bool {
        self.shared.send(message)
    }

    /// Send host microphone PCM (16 kHz mono)
    pub fn send_microphone(&self, pcm: Bytes) -> bool {
        self.send(&Message::AudioData(AudioData::microphone(pcm)))
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.read().clone()
    }

    pub fn router_stats(&self) -> RouterStats {
        self.shared
            .router_stats
            .lock()
            .as_ref()
            .map(|stats| stats.lock().clone())
            .unwrap_or_default()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    pub fn mixer_stats(&self) -> MixerStats {
        self.shared.mixer.stats()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        {
            let mut workers = self.workers.lock();
            if self.state() != SessionState::Idle && !workers.released {
                self.shutdown(&mut workers);
            }
        }
        self.shared.deliver_state_events();
    }
}

impl SessionShared {
    fn transition(&self, next: SessionState) -> SessionResult<()> {
        let previous = {
            let mut state = self.state.write();
            let previous = *state;
            if previous == next {
                return Ok(());
            }
            if !previous.can_transition_to(next) {
                return Err(SessionError::InvalidStateTransition {
                    from: previous,
                    to: next,
                });
            }
            *state = next;
            previous
        };

        info!("Session state: {} -> {}", previous, next);
        self.state_events.lock().push(next);
        Ok(())
    }

    /// Hand queued state changes to `events`; call with no controller lock held
    fn deliver_state_events(&self) {
        let pending = std::mem::take(&mut *self.state_events.lock());
        for state in pending {
            self.events.on_state_changed(state);
        }
    }

    fn send(&self, message: &Message) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            debug!(command = ?message.command(), "Not sending, session not running");
            return false;
        }

        match self.write_frame(&message.encode()) {
            Ok(()) => {
                trace!(command = ?message.command(), "Sent");
                true
            }
            Err(e) => {
                warn!("Failed to send {:?}: {}", message.command(), e);
                false
            }
        }
    }

    fn write_frame(&self, frame: &[u8]) -> TransportResult<()> {
        let result = {
            let _guard = self.write_lock.lock();
            self.transport.write_all(frame, self.options.write_timeout)
        };

        let mut stats = self.stats.write();
        match result {
            Ok(()) => {
                stats.messages_sent += 1;
                stats.bytes_sent += frame.len() as u64;
            }
            Err(_) => stats.send_failures += 1,
        }
        result
    }

    fn heartbeat(&self, now: Instant, tick: Option<HeartbeatTick>) {
        let result = self.write_frame(&Message::HeartBeat.encode());
        let ok = result.is_ok();
        self.watchdog.lock().record_heartbeat_result(now, ok);

        let mut stats = self.stats.write();
        if ok {
            stats.heartbeats_sent += 1;
        } else {
            stats.heartbeats_failed += 1;
        }
        if tick.is_some_and(|tick| tick.behind.is_some()) {
            stats.heartbeats_late += 1;
        }
        drop(stats);

        match result {
            Ok(()) => trace!(index = tick.map(|tick| tick.index), "Heartbeat"),
            Err(e) => warn!("Heartbeat write failed: {}", e),
        }
    }

    fn run_timer(&self, mut schedule: HeartbeatSchedule, wake_rx: Receiver<()>) {
        let policy = self.options.heartbeat_policy;
        let poll = self.options.watchdog_poll();
        debug!(?policy, interval_ms = schedule.interval().as_millis() as u64, "Heartbeat timer started");

        loop {
            let now = Instant::now();
            let mut wake = now + poll;
            if policy == HeartbeatPolicy::FixedCadence {
                wake = wake.min(schedule.next_due());
            }
            if let Some(connect_at) = *self.connect_at.lock() {
                wake = wake.min(connect_at);
            }

            match wake_rx.recv_timeout(wake.saturating_duration_since(now)) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let now = Instant::now();
            let connect_due = {
                let mut connect_at = self.connect_at.lock();
                match *connect_at {
                    Some(at) if now >= at => {
                        *connect_at = None;
                        true
                    }
                    _ => false,
                }
            };
            if connect_due {
                info!("Requesting phone connection");
                self.send(&connect_message());
            }

            match policy {
                HeartbeatPolicy::FixedCadence => {
                    if schedule.is_due(now) {
                        let tick = schedule.advance(now);
                        self.heartbeat(now, Some(tick));
                    }
                }
                HeartbeatPolicy::IdleTriggered => {
                    let idle = self.watchdog.lock().should_send_heartbeat(now);
                    if idle {
                        self.heartbeat(now, None);
                    }
                }
            }

            let verdict = self.watchdog.lock().check(Instant::now());
            if let Some(failure) = verdict {
                self.fail(failure);
                break;
            }
        }

        debug!(fired = schedule.fired(), "Heartbeat timer exited");
    }

    fn fail(&self, failure: LivenessFailure) {
        let idle_ms = failure.idle.as_millis() as u64;
        error!(
            reason = ?failure.reason,
            idle_ms,
            failures = failure.failures,
            "Adapter not responding, ending session"
        );

        self.running.store(false, Ordering::SeqCst);
        self.stats.write().liveness_failures += 1;
        self.events.on_error(&SessionError::LivenessTimeout {
            idle_ms,
            failures: failure.failures,
        });
        if let Err(e) = self.transition(SessionState::Disconnected) {
            debug!("Skipping state change after liveness failure: {}", e);
        }
        self.deliver_state_events();
    }

    fn handle_message(&self, message: &Message) {
        match message {
            Message::AudioData(audio) => self.handle_audio(audio),
            Message::Plugged(plugged) => {
                info!(phone = ?plugged.phone_type, wifi = ?plugged.wifi, "Phone plugged");
            }
            Message::Unplugged => info!("Phone unplugged"),
            Message::Phase(phase) => debug!(phase, "Adapter phase"),
            Message::Open(open) => {
                debug!("Adapter acknowledged Open {}x{}@{}", open.width, open.height, open.fps);
            }
            Message::SoftwareVersion(version) => info!("Adapter software version {}", version),
            Message::BoxSettings(settings) => debug!("Adapter settings: {}", settings.text),
            Message::Command(code) => debug!(?code, "Adapter command"),
            other => trace!(command = ?other.command(), "Inbound message"),
        }
    }

    fn handle_audio(&self, audio: &AudioData) {
        match &audio.body {
            AudioBody::Command(command) => {
                let action = self.audio_routing.lock().on_command(*command);
                debug!(?command, ?action, "Audio command");
                match action {
                    Some(StreamAction::Start(kind)) => self.mixer.start_stream(kind),
                    Some(StreamAction::Stop(kind)) => {
                        let outcome = self.mixer.stop_stream(kind);
                        debug!(%kind, ?outcome, "Audio stream stop");
                    }
                    None => {}
                }
            }
            AudioBody::VolumeDuration(duration) => {
                debug!(duration, volume = audio.volume, "Adapter volume ramp");
            }
            AudioBody::Pcm(pcm) => {
                let Some(format) = audio.format() else {
                    warn!(decode_type = audio.decode_type, "Unknown audio format, dropping PCM");
                    self.stats.write().audio_errors += 1;
                    return;
                };
                let kind = self.audio_routing.lock().route_pcm(audio.audio_type);
                if let Err(e) = self.mixer.write(kind, format, pcm) {
                    warn!("Audio write to {} failed: {}", kind, e);
                    self.stats.write().audio_errors += 1;
                }
            }
        }
    }
}

impl IngressHandler for SessionShared {
    fn on_frame_parsed(&self, header: &MessageHeader) {
        self.watchdog.lock().record_inbound(Instant::now());
        let mut stats = self.stats.write();
        stats.messages_received += 1;
        stats.bytes_received += (HEADER_SIZE + header.payload_len()) as u64;
    }

    fn on_message(&self, message: Message) {
        self.handle_message(&message);
        self.events.on_message(&message);
    }

    fn on_video_frame(&self, info: &VideoFrameInfo) {
        self.stats.write().video_frames += 1;
        self.events.on_video_frame(info);
    }

    fn on_decode_error(&self, error: ProtocolError) {
        self.stats.write().decode_errors += 1;
        self.events.on_error(&SessionError::Protocol(error));
    }

    fn on_read_loop_stopped(&self, reason: Option<TransportError>) {
        if let Some(e) = reason {
            if self.running.load(Ordering::SeqCst) {
                warn!("Ingress ended while the session is running: {}", e);
                self.events.on_error(&SessionError::Transport(e));
            }
        }
        self.events.on_read_loop_stopped();
    }
}

//! Ingress read loop
//!
//! One thread reads frames off the transport, reassembles them and hands them
//! to the session. Video payloads skip the generic path and are read straight
//! into a region owned by the video sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use frame_pool::BufferPool;
use link_protocol::{
    HEADER_SIZE, MAGIC, Message, MessageHeader, ProtocolError, VIDEO_PREFIX_SIZE, VideoFrameInfo,
    decode_header,
};
use link_transport::{Transport, TransportError, TransportResult};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::{SessionOptions, VideoSink};

/// Receives everything the ingress loop produces, on the ingress thread
pub trait IngressHandler: Send + Sync {
    /// A frame decoded successfully; resets adapter liveness
    fn on_frame_parsed(&self, header: &MessageHeader);

    fn on_message(&self, message: Message);

    fn on_video_frame(&self, info: &VideoFrameInfo);

    fn on_decode_error(&self, error: ProtocolError);

    /// Called last, exactly once; `reason` is `None` for a requested stop
    fn on_read_loop_stopped(&self, reason: Option<TransportError>);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub frames: u64,
    pub payload_bytes: u64,
    pub messages: u64,
    pub video_frames: u64,
    pub video_dropped: u64,
    pub oversized_discarded: u64,
    /// Every `on_decode_error` raised: bad headers (once per resync) and bad payloads
    pub decode_errors: u64,
    pub resync_episodes: u64,
    pub bytes_skipped: u64,
}

/// Ingress frame router
pub struct IngressRouter {
    transport: Arc<dyn Transport>,
    pool: Arc<BufferPool>,
    video: Arc<dyn VideoSink>,
    handler: Arc<dyn IngressHandler>,
    options: SessionOptions,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<RouterStats>>,
}

impl IngressRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        pool: Arc<BufferPool>,
        video: Arc<dyn VideoSink>,
        handler: Arc<dyn IngressHandler>,
        options: SessionOptions,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transport,
            pool,
            video,
            handler,
            options,
            running,
            stats: Arc::new(Mutex::new(RouterStats::default())),
        }
    }

    /// Shared handle to the counters, readable while the loop runs
    pub fn stats_handle(&self) -> Arc<Mutex<RouterStats>> {
        Arc::clone(&self.stats)
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.lock().clone()
    }

    /// Run until the running flag clears or the transport fails
    pub fn run(&self) {
        info!("Ingress loop started");
        let reason = match self.read_loop() {
            Ok(()) => None,
            Err(TransportError::Timeout) if !self.running.load(Ordering::SeqCst) => None,
            Err(e) => {
                if self.running.load(Ordering::SeqCst) {
                    warn!("Ingress loop stopped: {}", e);
                } else {
                    debug!("Ingress loop stopped during shutdown: {}", e);
                }
                Some(e)
            }
        };
        info!(stats = ?self.stats(), "Ingress loop exited");
        self.handler.on_read_loop_stopped(reason);
    }

    fn read_loop(&self) -> TransportResult<()> {
        let mut header_buf = [0u8; HEADER_SIZE];
        // bytes at the front of header_buf carried over from a failed decode
        let mut carried = 0usize;
        let mut resyncing = false;
        let mut skipped_in_episode = 0u64;

        while self.running.load(Ordering::SeqCst) {
            self.fill(&mut header_buf[carried..])?;
            carried = 0;

            let header = match decode_header(&header_buf) {
                Ok(header) => header,
                Err(e) => {
                    if !resyncing {
                        resyncing = true;
                        skipped_in_episode = 0;
                        warn!("Bad frame header, resynchronising: {}", e);
                        let mut stats = self.stats.lock();
                        stats.resync_episodes += 1;
                        stats.decode_errors += 1;
                        drop(stats);
                        self.handler.on_decode_error(e);
                    }
                    let offset = magic_candidate(&header_buf);
                    header_buf.copy_within(offset.., 0);
                    carried = HEADER_SIZE - offset;
                    skipped_in_episode += offset as u64;
                    self.stats.lock().bytes_skipped += offset as u64;
                    continue;
                }
            };

            if resyncing {
                resyncing = false;
                info!(skipped = skipped_in_episode, "Frame stream resynchronised");
            }

            self.route(&header)?;
        }

        Ok(())
    }

    fn route(&self, header: &MessageHeader) -> TransportResult<()> {
        let len = header.payload_len();
        trace!(command = header.command, len, "Frame");
        {
            let mut stats = self.stats.lock();
            stats.frames += 1;
            stats.payload_bytes += len as u64;
        }

        if len > self.options.max_frame_len {
            warn!(
                command = header.command,
                len,
                max = self.options.max_frame_len,
                "Oversized frame discarded"
            );
            self.stats.lock().oversized_discarded += 1;
            return self.discard(len);
        }

        if header.is_video() && len >= VIDEO_PREFIX_SIZE {
            return self.route_video(header, len);
        }

        if len == 0 {
            self.dispatch(header, &[]);
            return Ok(());
        }

        // the lease goes back to the pool even if the handler unwinds
        let mut lease = self.pool.lease(len);
        self.fill(&mut lease[..len])?;
        self.dispatch(header, &lease[..len]);
        Ok(())
    }

    fn route_video(&self, header: &MessageHeader, len: usize) -> TransportResult<()> {
        let mut prefix = [0u8; VIDEO_PREFIX_SIZE];
        self.fill(&mut prefix)?;
        let body_len = len - VIDEO_PREFIX_SIZE;

        let info = match VideoFrameInfo::parse(&prefix) {
            Ok(info) => info,
            Err(e) => {
                self.report_decode_error(e);
                return self.discard(body_len);
            }
        };

        let mut region = match self.video.acquire_input_region(body_len) {
            Ok(region) => region,
            Err(e) => {
                debug!("No video region for {} bytes, dropping frame: {}", body_len, e);
                self.stats.lock().video_dropped += 1;
                self.handler.on_frame_parsed(header);
                return self.discard(body_len);
            }
        };

        self.fill(region.prepare(body_len))?;
        region.set_info(info);
        self.handler.on_frame_parsed(header);

        match self.video.commit(region) {
            Ok(()) => {
                self.stats.lock().video_frames += 1;
                self.handler.on_video_frame(&info);
            }
            Err(e) => {
                warn!("Video sink rejected frame: {}", e);
                self.stats.lock().video_dropped += 1;
            }
        }
        Ok(())
    }

    fn dispatch(&self, header: &MessageHeader, payload: &[u8]) {
        match Message::decode(header.command, payload) {
            Ok(message) => {
                self.stats.lock().messages += 1;
                self.handler.on_frame_parsed(header);
                self.handler.on_message(message);
            }
            Err(e) => {
                warn!(command = header.command, len = payload.len(), "Dropping undecodable frame: {}", e);
                self.report_decode_error(e);
            }
        }
    }

    fn report_decode_error(&self, error: ProtocolError) {
        self.stats.lock().decode_errors += 1;
        self.handler.on_decode_error(error);
    }

    /// Read and throw away `len` bytes in bounded chunks
    fn discard(&self, mut len: usize) -> TransportResult<()> {
        if len == 0 {
            return Ok(());
        }
        let chunk = self.options.discard_chunk.max(1).min(len);
        let mut lease = self.pool.lease(chunk);
        while len > 0 {
            let n = chunk.min(len);
            self.fill(&mut lease[..n])?;
            len -= n;
        }
        Ok(())
    }

    /// `read_exact` that keeps waiting through timeouts while running
    fn fill(&self, buf: &mut [u8]) -> TransportResult<()> {
        loop {
            match self.transport.read_exact(buf, self.options.read_timeout) {
                Err(TransportError::Timeout) if self.running.load(Ordering::SeqCst) => continue,
                other => return other,
            }
        }
    }
}

/// Offset of the first position after 0 that could start a header
///
/// A position qualifies when the bytes from it to the end of `buf` match a
/// prefix of the encoded magic. Returns `buf.len()` when none does.
fn magic_candidate(buf: &[u8]) -> usize {
    let magic = MAGIC.to_le_bytes();
    (1..buf.len())
        .find(|&offset| {
            let tail = &buf[offset..];
            let n = tail.len().min(magic.len());
            tail[..n] == magic[..n]
        })
        .unwrap_or(buf.len())
}

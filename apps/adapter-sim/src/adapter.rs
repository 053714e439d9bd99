//! Scripted adapter on the device end of a memory link

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use link_protocol::{
    AudioBody, AudioCommand, AudioData, AudioFormat, HEADER_SIZE, Message, PhoneType, Plugged,
    VideoData, decode_header,
};
use link_transport::{MemoryTransport, Transport, TransportError};
use tracing::{debug, info, warn};

const POLL: Duration = Duration::from_millis(5);
const AUDIO_CHUNK_MS: u64 = 20;
const MEDIA_DECODE_TYPE: u32 = 1;

/// Answers the host like a phone-connected adapter would
///
/// After `Open` it reports a plugged phone, then streams fake video at the
/// configured frame rate and media PCM in 20ms chunks. Heartbeats are echoed.
pub struct SimulatedAdapter {
    device: MemoryTransport,
    running: Arc<AtomicBool>,
}

struct Streaming {
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_frame: Instant,
    next_audio: Instant,
    frames: u64,
}

impl SimulatedAdapter {
    pub fn new(device: MemoryTransport, running: Arc<AtomicBool>) -> Self {
        Self { device, running }
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("sim-adapter".into())
            .spawn(move || self.run())
    }

    fn run(self) {
        info!("Simulated adapter running");
        let mut streaming: Option<Streaming> = None;

        while self.running.load(Ordering::SeqCst) {
            match self.poll_frame() {
                Ok(Some(message)) => self.handle(message, &mut streaming),
                Ok(None) => {}
                Err(e) => {
                    debug!("Simulated adapter link closed: {}", e);
                    break;
                }
            }

            if let Some(state) = streaming.as_mut() {
                if let Err(e) = self.produce(state) {
                    debug!("Simulated adapter write failed: {}", e);
                    break;
                }
            }
        }
        info!("Simulated adapter stopped");
    }

    fn poll_frame(&self) -> Result<Option<Message>, TransportError> {
        let mut header = [0u8; HEADER_SIZE];
        match self.device.read_exact(&mut header, POLL) {
            Ok(()) => {}
            Err(TransportError::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        }

        let header = match decode_header(&header) {
            Ok(header) => header,
            Err(e) => {
                warn!("Host sent a bad header: {}", e);
                return Ok(None);
            }
        };
        let mut payload = vec![0u8; header.payload_len()];
        self.device.read_exact(&mut payload, Duration::from_secs(1))?;

        match Message::decode(header.command, &payload) {
            Ok(message) => Ok(Some(message)),
            Err(e) => {
                warn!("Host sent an undecodable frame: {}", e);
                Ok(None)
            }
        }
    }

    fn handle(&self, message: Message, streaming: &mut Option<Streaming>) {
        match message {
            Message::HeartBeat => self.reply(&Message::HeartBeat),
            Message::Open(open) => {
                info!("Host opened {}x{}@{}", open.width, open.height, open.fps);
                self.reply(&Message::Open(open));
                self.reply(&Message::SoftwareVersion("2025.02.25.1521CAY".into()));
                self.reply(&Message::Plugged(Plugged {
                    phone_type: PhoneType::CarPlay,
                    wifi: Some(1),
                }));
                self.reply(&Message::Phase(7));
                self.reply(&audio_command(AudioCommand::MediaStart));

                let now = Instant::now();
                *streaming = Some(Streaming {
                    width: open.width,
                    height: open.height,
                    frame_interval: Duration::from_secs(1) / open.fps.max(1),
                    next_frame: now,
                    next_audio: now,
                    frames: 0,
                });
            }
            other => debug!(command = ?other.command(), "Simulated adapter received"),
        }
    }

    fn produce(&self, state: &mut Streaming) -> Result<(), TransportError> {
        let now = Instant::now();

        if now >= state.next_frame {
            // NAL start code plus a frame counter; the content is never decoded
            let mut body = vec![0, 0, 0, 1, 0x65];
            body.extend_from_slice(&state.frames.to_le_bytes());
            body.resize(2048, 0);
            let frame = Message::VideoData(VideoData::new(state.width, state.height, body.into()));
            self.device.write_all(&frame.encode(), POLL)?;
            state.frames += 1;
            state.next_frame += state.frame_interval;
        }

        if now >= state.next_audio {
            let format = AudioFormat::from_decode_type(MEDIA_DECODE_TYPE).unwrap_or_default();
            let pcm = Bytes::from(vec![0u8; format.bytes_for_ms(AUDIO_CHUNK_MS)]);
            let audio = Message::AudioData(AudioData {
                decode_type: MEDIA_DECODE_TYPE,
                volume: 0.0,
                audio_type: 1,
                body: AudioBody::Pcm(pcm),
            });
            self.device.write_all(&audio.encode(), POLL)?;
            state.next_audio += Duration::from_millis(AUDIO_CHUNK_MS);
        }

        Ok(())
    }

    fn reply(&self, message: &Message) {
        if let Err(e) = self.device.write_all(&message.encode(), POLL) {
            warn!("Simulated adapter reply failed: {}", e);
        }
    }
}

fn audio_command(command: AudioCommand) -> Message {
    Message::AudioData(AudioData {
        decode_type: MEDIA_DECODE_TYPE,
        volume: 0.0,
        audio_type: 1,
        body: AudioBody::Command(command),
    })
}

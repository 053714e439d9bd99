//! Typed message catalog
//!
//! One [`Message`] variant per command. Fixed-shape payloads are decoded
//! with strict length checks; variable-shape payloads fail with
//! [`ProtocolError::TruncatedPayload`] instead of panicking on short input.
//! Unknown commands decode to [`Message::Unknown`] carrying the raw bytes.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    AudioCommand, AudioFormat, BoxSettings, CommandCode, CommandId, HEADER_SIZE, MessageHeader,
    ProtocolError, ProtocolResult, VIDEO_PREFIX_SIZE,
};

/// Size of the Open payload (seven u32 fields)
pub const OPEN_PAYLOAD_SIZE: usize = 28;

/// Size of a Touch payload and of one MultiTouch record
pub const TOUCH_RECORD_SIZE: usize = 16;

/// Fixed part of an AudioData payload before the body
pub const AUDIO_HEADER_SIZE: usize = 12;

/// Open: session parameters, all u32 LE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Open {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: u32,
    pub packet_max: u32,
    pub version: u32,
    pub mode: u32,
}

impl Open {
    pub fn from_config(config: &crate::DongleConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            format: config.format,
            packet_max: config.packet_max,
            version: config.box_version,
            mode: config.phone_work_mode,
        }
    }
}

/// Kind of phone attached to the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhoneType {
    AndroidMirror,
    CarPlay,
    IPhoneMirror,
    AndroidAuto,
    HiCar,
    Other(u32),
}

impl From<u32> for PhoneType {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::AndroidMirror,
            3 => Self::CarPlay,
            4 => Self::IPhoneMirror,
            5 => Self::AndroidAuto,
            6 => Self::HiCar,
            other => Self::Other(other),
        }
    }
}

impl PhoneType {
    pub fn code(self) -> u32 {
        match self {
            Self::AndroidMirror => 1,
            Self::CarPlay => 3,
            Self::IPhoneMirror => 4,
            Self::AndroidAuto => 5,
            Self::HiCar => 6,
            Self::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugged {
    pub phone_type: PhoneType,
    /// Present when the phone connected over wifi
    pub wifi: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TouchAction {
    Down,
    Move,
    Up,
    Other(u32),
}

impl TouchAction {
    pub fn code(self) -> u32 {
        match self {
            Self::Down => 14,
            Self::Move => 15,
            Self::Up => 16,
            Self::Other(code) => code,
        }
    }
}

impl From<u32> for TouchAction {
    fn from(code: u32) -> Self {
        match code {
            14 => Self::Down,
            15 => Self::Move,
            16 => Self::Up,
            other => Self::Other(other),
        }
    }
}

/// Single-pointer touch with fixed-point coordinates in 0..=10000
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touch {
    pub action: TouchAction,
    pub x: u32,
    pub y: u32,
    pub flags: u32,
}

impl Touch {
    /// Build a touch from normalised 0.0..=1.0 coordinates
    pub fn new(action: TouchAction, x: f32, y: f32) -> Self {
        Self {
            action,
            x: to_fixed_point(x),
            y: to_fixed_point(y),
            flags: 0,
        }
    }
}

fn to_fixed_point(value: f32) -> u32 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 10_000.0).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiTouchAction {
    Up,
    Down,
    Move,
    Other(u32),
}

impl MultiTouchAction {
    pub fn code(self) -> u32 {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::Move => 2,
            Self::Other(code) => code,
        }
    }
}

impl From<u32> for MultiTouchAction {
    fn from(code: u32) -> Self {
        match code {
            0 => Self::Up,
            1 => Self::Down,
            2 => Self::Move,
            other => Self::Other(other),
        }
    }
}

/// One pointer in a MultiTouch payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchPoint {
    pub x: f32,
    pub y: f32,
    pub action: MultiTouchAction,
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTouch {
    pub points: Vec<TouchPoint>,
}

impl MultiTouch {
    pub fn new(points: impl Into<Vec<TouchPoint>>) -> Self {
        Self {
            points: points.into(),
        }
    }
}

/// Metadata prefix of a VideoData payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoFrameInfo {
    pub width: u32,
    pub height: u32,
    pub flags: u32,
    pub length: u32,
    pub reserved: u32,
}

impl VideoFrameInfo {
    /// Parse the 20-byte prefix
    pub fn parse(prefix: &[u8]) -> ProtocolResult<Self> {
        let mut reader = PayloadReader::new(CommandId::VideoData.code(), prefix);
        Ok(Self {
            width: reader.u32()?,
            height: reader.u32()?,
            flags: reader.u32()?,
            length: reader.u32()?,
            reserved: reader.u32()?,
        })
    }

    pub fn write_to(&self, out: &mut BytesMut) {
        out.put_u32_le(self.width);
        out.put_u32_le(self.height);
        out.put_u32_le(self.flags);
        out.put_u32_le(self.length);
        out.put_u32_le(self.reserved);
    }
}

/// Full VideoData payload, used where the fast path is not taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoData {
    pub info: VideoFrameInfo,
    /// H.264 bytes following the prefix
    pub data: Bytes,
}

impl VideoData {
    pub fn new(width: u32, height: u32, data: Bytes) -> Self {
        Self {
            info: VideoFrameInfo {
                width,
                height,
                flags: 0,
                length: data.len() as u32,
                reserved: 0,
            },
            data,
        }
    }
}

/// What follows the fixed AudioData fields
#[derive(Debug, Clone, PartialEq)]
pub enum AudioBody {
    Command(AudioCommand),
    /// Duration in seconds of a volume ramp
    VolumeDuration(f32),
    Pcm(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub decode_type: u32,
    pub volume: f32,
    pub audio_type: u32,
    pub body: AudioBody,
}

impl AudioData {
    /// Host microphone PCM (16 kHz mono)
    pub fn microphone(pcm: Bytes) -> Self {
        Self {
            decode_type: 5,
            volume: 0.0,
            audio_type: 3,
            body: AudioBody::Pcm(pcm),
        }
    }

    pub fn format(&self) -> Option<AudioFormat> {
        AudioFormat::from_decode_type(self.decode_type)
    }

    /// Navigation prompts arrive on audio type 2
    pub fn is_navigation(&self) -> bool {
        self.audio_type == 2
    }
}

/// File written to the adapter's filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFile {
    pub name: String,
    pub content: Bytes,
}

impl SendFile {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn number(name: impl Into<String>, value: u32) -> Self {
        Self::new(name, Bytes::copy_from_slice(&value.to_le_bytes()))
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::number(name, value as u32)
    }

    pub fn string(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, Bytes::copy_from_slice(value.as_bytes()))
    }
}

/// BoxSettings text, with the parsed JSON when it is valid
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSettingsPayload {
    pub text: String,
    pub json: Option<serde_json::Value>,
}

impl BoxSettingsPayload {
    pub fn from_settings(settings: &BoxSettings) -> ProtocolResult<Self> {
        let json = serde_json::to_value(settings)?;
        Ok(Self {
            text: json.to_string(),
            json: Some(json),
        })
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Open(Open),
    Plugged(Plugged),
    Phase(u32),
    Unplugged,
    Touch(Touch),
    VideoData(VideoData),
    AudioData(AudioData),
    Command(CommandCode),
    LogoType(u32),
    BluetoothAddress(String),
    BluetoothPin(String),
    BluetoothDeviceName(String),
    WifiDeviceName(String),
    DisconnectPhone,
    BluetoothPairedList(String),
    ManufacturerInfo(String),
    CloseDongle,
    MultiTouch(MultiTouch),
    HiCarLink(String),
    BoxSettings(BoxSettingsPayload),
    MediaData(Bytes),
    SendFile(SendFile),
    HeartBeat,
    SoftwareVersion(String),
    Unknown { command: u32, payload: Bytes },
}

impl Message {
    /// Command id this message is framed with
    pub fn command(&self) -> CommandId {
        match self {
            Self::Open(_) => CommandId::Open,
            Self::Plugged(_) => CommandId::Plugged,
            Self::Phase(_) => CommandId::Phase,
            Self::Unplugged => CommandId::Unplugged,
            Self::Touch(_) => CommandId::Touch,
            Self::VideoData(_) => CommandId::VideoData,
            Self::AudioData(_) => CommandId::AudioData,
            Self::Command(_) => CommandId::Command,
            Self::LogoType(_) => CommandId::LogoType,
            Self::BluetoothAddress(_) => CommandId::BluetoothAddress,
            Self::BluetoothPin(_) => CommandId::BluetoothPin,
            Self::BluetoothDeviceName(_) => CommandId::BluetoothDeviceName,
            Self::WifiDeviceName(_) => CommandId::WifiDeviceName,
            Self::DisconnectPhone => CommandId::DisconnectPhone,
            Self::BluetoothPairedList(_) => CommandId::BluetoothPairedList,
            Self::ManufacturerInfo(_) => CommandId::ManufacturerInfo,
            Self::CloseDongle => CommandId::CloseDongle,
            Self::MultiTouch(_) => CommandId::MultiTouch,
            Self::HiCarLink(_) => CommandId::HiCarLink,
            Self::BoxSettings(_) => CommandId::BoxSettings,
            Self::MediaData(_) => CommandId::MediaData,
            Self::SendFile(_) => CommandId::SendFile,
            Self::HeartBeat => CommandId::HeartBeat,
            Self::SoftwareVersion(_) => CommandId::SoftwareVersion,
            Self::Unknown { command, .. } => CommandId::Unknown(*command),
        }
    }

    /// Build a BoxSettings message from the settings struct
    pub fn box_settings(settings: &BoxSettings) -> ProtocolResult<Self> {
        Ok(Self::BoxSettings(BoxSettingsPayload::from_settings(settings)?))
    }

    /// Decode the payload of a frame whose header carried `command`
    pub fn decode(command: u32, payload: &[u8]) -> ProtocolResult<Self> {
        let id = CommandId::from(command);
        let mut reader = PayloadReader::new(command, payload);

        let message = match id {
            CommandId::Open => {
                reader.expect_len(OPEN_PAYLOAD_SIZE)?;
                Self::Open(Open {
                    width: reader.u32()?,
                    height: reader.u32()?,
                    fps: reader.u32()?,
                    format: reader.u32()?,
                    packet_max: reader.u32()?,
                    version: reader.u32()?,
                    mode: reader.u32()?,
                })
            }
            CommandId::Plugged => {
                let phone_type = PhoneType::from(reader.u32()?);
                let wifi = if reader.remaining() >= 4 {
                    Some(reader.u32()?)
                } else {
                    None
                };
                Self::Plugged(Plugged { phone_type, wifi })
            }
            CommandId::Phase => Self::Phase(reader.u32()?),
            CommandId::Unplugged => Self::Unplugged,
            CommandId::Touch => {
                reader.expect_len(TOUCH_RECORD_SIZE)?;
                Self::Touch(Touch {
                    action: TouchAction::from(reader.u32()?),
                    x: reader.u32()?,
                    y: reader.u32()?,
                    flags: reader.u32()?,
                })
            }
            CommandId::VideoData => {
                let info = VideoFrameInfo::parse(reader.take(VIDEO_PREFIX_SIZE)?)?;
                Self::VideoData(VideoData {
                    info,
                    data: Bytes::copy_from_slice(reader.rest()),
                })
            }
            CommandId::AudioData => Self::AudioData(decode_audio(&mut reader)?),
            CommandId::Command => Self::Command(CommandCode::from(reader.u32()?)),
            CommandId::LogoType => Self::LogoType(reader.u32()?),
            CommandId::BluetoothAddress => Self::BluetoothAddress(decode_text(command, payload)?),
            CommandId::BluetoothPin => Self::BluetoothPin(decode_text(command, payload)?),
            CommandId::BluetoothDeviceName => {
                Self::BluetoothDeviceName(decode_text(command, payload)?)
            }
            CommandId::WifiDeviceName => Self::WifiDeviceName(decode_text(command, payload)?),
            CommandId::DisconnectPhone => Self::DisconnectPhone,
            CommandId::BluetoothPairedList => {
                Self::BluetoothPairedList(decode_text(command, payload)?)
            }
            CommandId::ManufacturerInfo => Self::ManufacturerInfo(decode_text(command, payload)?),
            CommandId::CloseDongle => Self::CloseDongle,
            CommandId::MultiTouch => {
                if payload.len() % TOUCH_RECORD_SIZE != 0 {
                    return Err(ProtocolError::LengthMismatch {
                        command,
                        expected: payload.len() - payload.len() % TOUCH_RECORD_SIZE,
                        actual: payload.len(),
                    });
                }
                let mut points = Vec::with_capacity(payload.len() / TOUCH_RECORD_SIZE);
                while reader.remaining() > 0 {
                    points.push(TouchPoint {
                        x: reader.f32()?,
                        y: reader.f32()?,
                        action: MultiTouchAction::from(reader.u32()?),
                        id: reader.u32()?,
                    });
                }
                Self::MultiTouch(MultiTouch { points })
            }
            CommandId::HiCarLink => Self::HiCarLink(decode_text(command, payload)?),
            CommandId::BoxSettings => {
                let text = decode_text(command, payload)?;
                let json = serde_json::from_str(&text).ok();
                Self::BoxSettings(BoxSettingsPayload { text, json })
            }
            CommandId::MediaData => Self::MediaData(Bytes::copy_from_slice(payload)),
            CommandId::SendFile => {
                let name_len = reader.u32()? as usize;
                let name = strip_nul(reader.take(name_len)?);
                let name = std::str::from_utf8(name)
                    .map_err(|_| ProtocolError::InvalidText(command))?
                    .to_string();
                let content_len = reader.u32()? as usize;
                let content = Bytes::copy_from_slice(reader.take(content_len)?);
                Self::SendFile(SendFile { name, content })
            }
            CommandId::HeartBeat => Self::HeartBeat,
            CommandId::SoftwareVersion => Self::SoftwareVersion(decode_text(command, payload)?),
            CommandId::Unknown(_) => {
                trace!(command, length = payload.len(), "Unrecognized command");
                Self::Unknown {
                    command,
                    payload: Bytes::copy_from_slice(payload),
                }
            }
        };

        Ok(message)
    }

    /// Encode only the payload bytes
    pub fn encode_payload(&self) -> Bytes {
        let mut out = BytesMut::new();
        self.write_payload(&mut out);
        out.freeze()
    }

    /// Encode a complete frame: header followed by payload
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(HEADER_SIZE + 64);
        out.put_bytes(0, HEADER_SIZE);
        self.write_payload(&mut out);
        let payload_len = (out.len() - HEADER_SIZE) as u32;
        let header = MessageHeader::new(self.command().code(), payload_len);
        out[..HEADER_SIZE].copy_from_slice(&header.encode());
        out.freeze()
    }

    fn write_payload(&self, out: &mut BytesMut) {
        match self {
            Self::Open(open) => {
                out.reserve(OPEN_PAYLOAD_SIZE);
                out.put_u32_le(open.width);
                out.put_u32_le(open.height);
                out.put_u32_le(open.fps);
                out.put_u32_le(open.format);
                out.put_u32_le(open.packet_max);
                out.put_u32_le(open.version);
                out.put_u32_le(open.mode);
            }
            Self::Plugged(plugged) => {
                out.put_u32_le(plugged.phone_type.code());
                if let Some(wifi) = plugged.wifi {
                    out.put_u32_le(wifi);
                }
            }
            Self::Phase(value) | Self::LogoType(value) => out.put_u32_le(*value),
            Self::Touch(touch) => {
                out.put_u32_le(touch.action.code());
                out.put_u32_le(touch.x);
                out.put_u32_le(touch.y);
                out.put_u32_le(touch.flags);
            }
            Self::VideoData(video) => {
                video.info.write_to(out);
                out.extend_from_slice(&video.data);
            }
            Self::AudioData(audio) => {
                out.put_u32_le(audio.decode_type);
                out.put_f32_le(audio.volume);
                out.put_u32_le(audio.audio_type);
                match &audio.body {
                    AudioBody::Command(cmd) => out.put_u8(cmd.code()),
                    AudioBody::VolumeDuration(secs) => out.put_f32_le(*secs),
                    AudioBody::Pcm(pcm) => out.extend_from_slice(pcm),
                }
            }
            Self::Command(code) => out.put_u32_le(code.code()),
            Self::BluetoothAddress(text)
            | Self::BluetoothPin(text)
            | Self::BluetoothDeviceName(text)
            | Self::WifiDeviceName(text)
            | Self::BluetoothPairedList(text)
            | Self::ManufacturerInfo(text)
            | Self::HiCarLink(text)
            | Self::SoftwareVersion(text) => out.extend_from_slice(text.as_bytes()),
            Self::BoxSettings(settings) => out.extend_from_slice(settings.text.as_bytes()),
            Self::MultiTouch(multi) => {
                for point in &multi.points {
                    out.put_f32_le(point.x);
                    out.put_f32_le(point.y);
                    out.put_u32_le(point.action.code());
                    out.put_u32_le(point.id);
                }
            }
            Self::MediaData(raw) => out.extend_from_slice(raw),
            Self::SendFile(file) => {
                let name = file.name.as_bytes();
                out.put_u32_le(name.len() as u32 + 1);
                out.extend_from_slice(name);
                out.put_u8(0);
                out.put_u32_le(file.content.len() as u32);
                out.extend_from_slice(&file.content);
            }
            Self::Unplugged | Self::DisconnectPhone | Self::CloseDongle | Self::HeartBeat => {}
            Self::Unknown { payload, .. } => out.extend_from_slice(payload),
        }
    }
}

fn decode_audio(reader: &mut PayloadReader<'_>) -> ProtocolResult<AudioData> {
    let decode_type = reader.u32()?;
    let volume = reader.f32()?;
    let audio_type = reader.u32()?;

    let body = match reader.remaining() {
        1 => AudioBody::Command(AudioCommand::from(reader.take(1)?[0])),
        4 => AudioBody::VolumeDuration(reader.f32()?),
        _ => AudioBody::Pcm(Bytes::copy_from_slice(reader.rest())),
    };

    Ok(AudioData {
        decode_type,
        volume,
        audio_type,
        body,
    })
}

fn strip_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

fn decode_text(command: u32, payload: &[u8]) -> ProtocolResult<String> {
    std::str::from_utf8(strip_nul(payload))
        .map(str::to_string)
        .map_err(|_| ProtocolError::InvalidText(command))
}

/// Bounds-checked little-endian cursor over a payload
struct PayloadReader<'a> {
    command: u32,
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(command: u32, data: &'a [u8]) -> Self {
        Self {
            command,
            data,
            pos: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn expect_len(&self, expected: usize) -> ProtocolResult<()> {
        if self.data.len() != expected {
            return Err(ProtocolError::LengthMismatch {
                command: self.command,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> ProtocolResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::TruncatedPayload {
                command: self.command,
                expected: self.pos.saturating_add(len),
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    fn u32(&mut self) -> ProtocolResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn f32(&mut self) -> ProtocolResult<f32> {
        self.u32().map(f32::from_bits)
    }
}

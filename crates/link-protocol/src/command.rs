//! Command identifiers and control command codes

use serde::{Deserialize, Serialize};

/// Frame command identifier carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandId {
    Open,
    Plugged,
    Phase,
    Unplugged,
    Touch,
    VideoData,
    AudioData,
    Command,
    LogoType,
    BluetoothAddress,
    BluetoothPin,
    BluetoothDeviceName,
    WifiDeviceName,
    DisconnectPhone,
    BluetoothPairedList,
    ManufacturerInfo,
    CloseDongle,
    MultiTouch,
    HiCarLink,
    BoxSettings,
    MediaData,
    SendFile,
    HeartBeat,
    SoftwareVersion,
    /// Vendor extension or unassigned id
    Unknown(u32),
}

impl CommandId {
    pub const fn code(self) -> u32 {
        match self {
            Self::Open => 0x01,
            Self::Plugged => 0x02,
            Self::Phase => 0x03,
            Self::Unplugged => 0x04,
            Self::Touch => 0x05,
            Self::VideoData => 0x06,
            Self::AudioData => 0x07,
            Self::Command => 0x08,
            Self::LogoType => 0x09,
            Self::BluetoothAddress => 0x0A,
            Self::BluetoothPin => 0x0C,
            Self::BluetoothDeviceName => 0x0D,
            Self::WifiDeviceName => 0x0E,
            Self::DisconnectPhone => 0x0F,
            Self::BluetoothPairedList => 0x12,
            Self::ManufacturerInfo => 0x14,
            Self::CloseDongle => 0x15,
            Self::MultiTouch => 0x17,
            Self::HiCarLink => 0x18,
            Self::BoxSettings => 0x19,
            Self::MediaData => 0x2A,
            Self::SendFile => 0x99,
            Self::HeartBeat => 0xAA,
            Self::SoftwareVersion => 0xCC,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u32> for CommandId {
    fn from(code: u32) -> Self {
        match code {
            0x01 => Self::Open,
            0x02 => Self::Plugged,
            0x03 => Self::Phase,
            0x04 => Self::Unplugged,
            0x05 => Self::Touch,
            0x06 => Self::VideoData,
            0x07 => Self::AudioData,
            0x08 => Self::Command,
            0x09 => Self::LogoType,
            0x0A => Self::BluetoothAddress,
            0x0C => Self::BluetoothPin,
            0x0D => Self::BluetoothDeviceName,
            0x0E => Self::WifiDeviceName,
            0x0F => Self::DisconnectPhone,
            0x12 => Self::BluetoothPairedList,
            0x14 => Self::ManufacturerInfo,
            0x15 => Self::CloseDongle,
            0x17 => Self::MultiTouch,
            0x18 => Self::HiCarLink,
            0x19 => Self::BoxSettings,
            0x2A => Self::MediaData,
            0x99 => Self::SendFile,
            0xAA => Self::HeartBeat,
            0xCC => Self::SoftwareVersion,
            other => Self::Unknown(other),
        }
    }
}

impl From<CommandId> for u32 {
    fn from(id: CommandId) -> Self {
        id.code()
    }
}

/// Value of a `Command` (0x08) payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCode {
    StartRecordAudio,
    StopRecordAudio,
    RequestHostUi,
    Siri,
    Mic,
    Frame,
    BoxMic,
    NightModeOn,
    NightModeOff,
    AudioTransferOn,
    AudioTransferOff,
    Wifi24g,
    Wifi5g,
    Left,
    Right,
    SelectDown,
    SelectUp,
    Back,
    Down,
    Home,
    Play,
    Pause,
    Next,
    Prev,
    RequestVideoFocus,
    ReleaseVideoFocus,
    WifiEnable,
    AutoConnect,
    WifiConnect,
    ScanningDevice,
    DeviceFound,
    DeviceNotFound,
    ConnectDeviceFailed,
    BtConnected,
    BtDisconnected,
    WifiConnected,
    WifiDisconnected,
    BtPairStart,
    WifiPair,
    Other(u32),
}

impl CommandCode {
    pub const fn code(self) -> u32 {
        match self {
            Self::StartRecordAudio => 1,
            Self::StopRecordAudio => 2,
            Self::RequestHostUi => 3,
            Self::Siri => 5,
            Self::Mic => 7,
            Self::Frame => 12,
            Self::BoxMic => 15,
            Self::NightModeOn => 16,
            Self::NightModeOff => 17,
            Self::AudioTransferOn => 22,
            Self::AudioTransferOff => 23,
            Self::Wifi24g => 24,
            Self::Wifi5g => 25,
            Self::Left => 100,
            Self::Right => 101,
            Self::SelectDown => 104,
            Self::SelectUp => 105,
            Self::Back => 106,
            Self::Down => 114,
            Self::Home => 200,
            Self::Play => 201,
            Self::Pause => 202,
            Self::Next => 204,
            Self::Prev => 205,
            Self::RequestVideoFocus => 500,
            Self::ReleaseVideoFocus => 501,
            Self::WifiEnable => 1000,
            Self::AutoConnect => 1001,
            Self::WifiConnect => 1002,
            Self::ScanningDevice => 1003,
            Self::DeviceFound => 1004,
            Self::DeviceNotFound => 1005,
            Self::ConnectDeviceFailed => 1006,
            Self::BtConnected => 1007,
            Self::BtDisconnected => 1008,
            Self::WifiConnected => 1009,
            Self::WifiDisconnected => 1010,
            Self::BtPairStart => 1011,
            Self::WifiPair => 1012,
            Self::Other(code) => code,
        }
    }
}

impl From<u32> for CommandCode {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::StartRecordAudio,
            2 => Self::StopRecordAudio,
            3 => Self::RequestHostUi,
            5 => Self::Siri,
            7 => Self::Mic,
            12 => Self::Frame,
            15 => Self::BoxMic,
            16 => Self::NightModeOn,
            17 => Self::NightModeOff,
            22 => Self::AudioTransferOn,
            23 => Self::AudioTransferOff,
            24 => Self::Wifi24g,
            25 => Self::Wifi5g,
            100 => Self::Left,
            101 => Self::Right,
            104 => Self::SelectDown,
            105 => Self::SelectUp,
            106 => Self::Back,
            114 => Self::Down,
            200 => Self::Home,
            201 => Self::Play,
            202 => Self::Pause,
            204 => Self::Next,
            205 => Self::Prev,
            500 => Self::RequestVideoFocus,
            501 => Self::ReleaseVideoFocus,
            1000 => Self::WifiEnable,
            1001 => Self::AutoConnect,
            1002 => Self::WifiConnect,
            1003 => Self::ScanningDevice,
            1004 => Self::DeviceFound,
            1005 => Self::DeviceNotFound,
            1006 => Self::ConnectDeviceFailed,
            1007 => Self::BtConnected,
            1008 => Self::BtDisconnected,
            1009 => Self::WifiConnected,
            1010 => Self::WifiDisconnected,
            1011 => Self::BtPairStart,
            1012 => Self::WifiPair,
            other => Self::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_id_codes() {
        for code in 0u32..=0xFF {
            assert_eq!(CommandId::from(code).code(), code);
        }
        assert_eq!(CommandId::from(0x0B), CommandId::Unknown(0x0B));
        assert_eq!(CommandId::from(0xAA), CommandId::HeartBeat);
    }

    #[test]
    fn test_command_code_unknown_preserved() {
        assert_eq!(CommandCode::from(1002), CommandCode::WifiConnect);
        assert_eq!(CommandCode::from(4242), CommandCode::Other(4242));
        assert_eq!(CommandCode::Other(4242).code(), 4242);
    }
}

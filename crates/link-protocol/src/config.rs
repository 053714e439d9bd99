//! Adapter configuration

use serde::{Deserialize, Serialize};

use crate::CommandCode;

/// Which side of the vehicle the driver sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandDrive {
    Left,
    Right,
}

impl HandDrive {
    /// Value written to the adapter's hand-drive file
    pub fn file_value(self) -> u32 {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WifiBand {
    Band24G,
    Band5G,
}

impl WifiBand {
    pub fn command(self) -> CommandCode {
        match self {
            Self::Band24G => CommandCode::Wifi24g,
            Self::Band5G => CommandCode::Wifi5g,
        }
    }
}

/// Microphone used for calls and voice assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicSource {
    /// Host microphone, PCM is sent by the host
    Os,
    /// Microphone built into the adapter
    Box,
}

impl MicSource {
    pub fn command(self) -> CommandCode {
        match self {
            Self::Os => CommandCode::Mic,
            Self::Box => CommandCode::BoxMic,
        }
    }
}

/// Session configuration handed to the adapter at start
///
/// Treated as immutable once a session starts. A resolution change needs a
/// new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DongleConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub dpi: u32,
    pub format: u32,
    pub packet_max: u32,
    pub box_version: u32,
    pub phone_work_mode: u32,
    pub box_name: String,
    pub hand_drive: HandDrive,
    pub night_mode: bool,
    pub audio_transfer_mode: bool,
    pub wifi_band: WifiBand,
    pub mic_source: MicSource,
    /// Media latency hint in milliseconds
    pub media_delay: u32,
    pub android_work_mode: Option<bool>,
}

impl Default for DongleConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            fps: 30,
            dpi: 160,
            format: 5,
            packet_max: 49_152,
            box_version: 2,
            phone_work_mode: 2,
            box_name: "nodePlay".to_string(),
            hand_drive: HandDrive::Left,
            night_mode: false,
            audio_transfer_mode: false,
            wifi_band: WifiBand::Band5G,
            mic_source: MicSource::Os,
            media_delay: 300,
            android_work_mode: None,
        }
    }
}

impl DongleConfig {
    /// Companion configuration text written to `/etc/airplay.conf`
    pub fn airplay_conf(&self) -> String {
        format!(
            "oemIconVisible = 0\nname = {name}\nmodel = Magic-Car-Link-1.00\noemIconPath = /etc/oem_icon.png\noemIconLabel = {name}\n",
            name = self.box_name
        )
    }

    /// JSON settings block sent as BoxSettings during init
    pub fn box_settings(&self, sync_time: u64) -> BoxSettings {
        BoxSettings {
            media_delay: self.media_delay,
            sync_time,
            android_auto_size_w: self.width,
            android_auto_size_h: self.height,
        }
    }
}

/// Host-to-adapter BoxSettings JSON body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxSettings {
    pub media_delay: u32,
    /// Host wall clock in seconds since the Unix epoch
    pub sync_time: u64,
    pub android_auto_size_w: u32,
    pub android_auto_size_h: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DongleConfig =
            serde_json::from_str(r#"{"width": 2400, "height": 960, "fps": 60}"#).unwrap();
        assert_eq!(config.width, 2400);
        assert_eq!(config.height, 960);
        assert_eq!(config.fps, 60);
        assert_eq!(config.dpi, 160);
        assert_eq!(config.box_name, "nodePlay");
        assert_eq!(config.android_work_mode, None);
    }

    #[test]
    fn test_box_settings_json_keys() {
        let settings = DongleConfig::default().box_settings(1_700_000_000);
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["mediaDelay"], 300);
        assert_eq!(json["syncTime"], 1_700_000_000u64);
        assert_eq!(json["androidAutoSizeW"], 800);
        assert_eq!(json["androidAutoSizeH"], 480);
    }

    #[test]
    fn test_airplay_conf_carries_name() {
        let config = DongleConfig {
            box_name: "Carlink".into(),
            ..Default::default()
        };
        let text = config.airplay_conf();
        assert!(text.contains("name = Carlink\n"));
        assert!(text.ends_with('\n'));
    }
}

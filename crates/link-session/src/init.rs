//! Adapter initialization sequence

use std::time::{SystemTime, UNIX_EPOCH};

use link_protocol::{CommandCode, DongleConfig, Message, Open, ProtocolResult, SendFile};

/// Adapter file paths written during init
pub mod paths {
    pub const SCREEN_DPI: &str = "/tmp/screen_dpi";
    pub const NIGHT_MODE: &str = "/tmp/night_mode";
    pub const HAND_DRIVE_MODE: &str = "/tmp/hand_drive_mode";
    pub const CHARGE_MODE: &str = "/tmp/charge_mode";
    pub const BOX_NAME: &str = "/etc/box_name";
    pub const AIRPLAY_CONF: &str = "/etc/airplay.conf";
    pub const ANDROID_WORK_MODE: &str = "/etc/android_work_mode";
}

/// Messages sent after the transport opens, in wire order
///
/// The adapter applies file writes as they arrive, so `screen_dpi` must
/// precede `Open` and everything else follows it.
pub fn init_sequence(config: &DongleConfig, sync_time: u64) -> ProtocolResult<Vec<Message>> {
    let audio_transfer = if config.audio_transfer_mode {
        CommandCode::AudioTransferOn
    } else {
        CommandCode::AudioTransferOff
    };

    let mut messages = vec![
        Message::SendFile(SendFile::number(paths::SCREEN_DPI, config.dpi)),
        Message::Open(Open::from_config(config)),
        Message::SendFile(SendFile::boolean(paths::NIGHT_MODE, config.night_mode)),
        Message::SendFile(SendFile::number(
            paths::HAND_DRIVE_MODE,
            config.hand_drive.file_value(),
        )),
        Message::SendFile(SendFile::string(paths::BOX_NAME, &config.box_name)),
        Message::SendFile(SendFile::string(paths::AIRPLAY_CONF, &config.airplay_conf())),
        Message::SendFile(SendFile::boolean(paths::CHARGE_MODE, true)),
        Message::Command(config.wifi_band.command()),
        Message::box_settings(&config.box_settings(sync_time))?,
        Message::Command(CommandCode::WifiEnable),
        Message::Command(config.mic_source.command()),
        Message::Command(audio_transfer),
    ];

    if let Some(enabled) = config.android_work_mode {
        messages.push(Message::SendFile(SendFile::boolean(
            paths::ANDROID_WORK_MODE,
            enabled,
        )));
    }

    Ok(messages)
}

/// One-shot message sent `connect_delay` after init
pub fn connect_message() -> Message {
    Message::Command(CommandCode::WifiConnect)
}

/// Host wall clock for the BoxSettings `syncTime` field
pub fn unix_time_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use link_protocol::{CommandId, HandDrive, MicSource, WifiBand};

    fn file_name(message: &Message) -> &str {
        match message {
            Message::SendFile(file) => &file.name,
            other => panic!("expected SendFile, got {:?}", other.command()),
        }
    }

    #[test]
    fn test_default_order() {
        let messages = init_sequence(&DongleConfig::default(), 1_700_000_000).unwrap();
        let commands: Vec<CommandId> = messages.iter().map(Message::command).collect();

        assert_eq!(messages.len(), 12);
        assert_eq!(file_name(&messages[0]), paths::SCREEN_DPI);
        assert_eq!(commands[1], CommandId::Open);
        assert_eq!(file_name(&messages[2]), paths::NIGHT_MODE);
        assert_eq!(file_name(&messages[5]), paths::AIRPLAY_CONF);
        assert_eq!(file_name(&messages[6]), paths::CHARGE_MODE);
        assert_eq!(messages[7], Message::Command(CommandCode::Wifi5g));
        assert_eq!(commands[8], CommandId::BoxSettings);
        assert_eq!(messages[9], Message::Command(CommandCode::WifiEnable));
        assert_eq!(messages[10], Message::Command(CommandCode::Mic));
        assert_eq!(messages[11], Message::Command(CommandCode::AudioTransferOff));
    }

    #[test]
    fn test_open_carries_resolution() {
        let config = DongleConfig {
            width: 2400,
            height: 960,
            fps: 60,
            ..Default::default()
        };
        let messages = init_sequence(&config, 0).unwrap();
        let Message::Open(open) = &messages[1] else {
            panic!("second message must be Open");
        };
        assert_eq!((open.width, open.height, open.fps), (2400, 960, 60));
        assert_eq!(messages[1].encode_payload().len(), 28);
    }

    #[test]
    fn test_config_driven_entries() {
        let config = DongleConfig {
            hand_drive: HandDrive::Right,
            wifi_band: WifiBand::Band24G,
            mic_source: MicSource::Box,
            audio_transfer_mode: true,
            android_work_mode: Some(true),
            ..Default::default()
        };
        let messages = init_sequence(&config, 0).unwrap();

        assert_eq!(messages.len(), 13);
        assert_eq!(
            messages[3],
            Message::SendFile(SendFile::number(paths::HAND_DRIVE_MODE, 1))
        );
        assert_eq!(messages[7], Message::Command(CommandCode::Wifi24g));
        assert_eq!(messages[10], Message::Command(CommandCode::BoxMic));
        assert_eq!(messages[11], Message::Command(CommandCode::AudioTransferOn));
        assert_eq!(file_name(&messages[12]), paths::ANDROID_WORK_MODE);
    }

    #[test]
    fn test_box_settings_sync_time() {
        let messages = init_sequence(&DongleConfig::default(), 42).unwrap();
        let Message::BoxSettings(settings) = &messages[8] else {
            panic!("expected BoxSettings");
        };
        let json = settings.json.as_ref().unwrap();
        assert_eq!(json["syncTime"], 42);
    }
}

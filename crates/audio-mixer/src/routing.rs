//! Mapping of adapter audio traffic onto logical streams

use link_protocol::AudioCommand;

use crate::StreamKind;

/// Stream lifecycle change requested by an audio command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start(StreamKind),
    Stop(StreamKind),
}

/// Tracks call/assistant state to pick the stream for incoming PCM
#[derive(Debug, Clone, Default)]
pub struct StreamRouter {
    call_active: bool,
    siri_active: bool,
}

impl StreamRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream for a PCM payload with the given `audio_type`
    pub fn route_pcm(&self, audio_type: u32) -> StreamKind {
        if audio_type == 2 {
            StreamKind::Navigation
        } else if self.call_active {
            StreamKind::Call
        } else if self.siri_active {
            StreamKind::Voice
        } else {
            StreamKind::Media
        }
    }

    pub fn on_command(&mut self, command: AudioCommand) -> Option<StreamAction> {
        use AudioCommand::*;

        let action = match command {
            OutputStart | MediaStart => StreamAction::Start(StreamKind::Media),
            OutputStop | MediaStop => StreamAction::Stop(StreamKind::Media),
            NaviStart | AlertStart => StreamAction::Start(StreamKind::Navigation),
            NaviStop | AlertStop => StreamAction::Stop(StreamKind::Navigation),
            SiriStart => {
                self.siri_active = true;
                StreamAction::Start(StreamKind::Voice)
            }
            SiriStop => {
                self.siri_active = false;
                StreamAction::Stop(StreamKind::Voice)
            }
            PhonecallStart => {
                self.call_active = true;
                StreamAction::Start(StreamKind::Call)
            }
            PhonecallStop => {
                self.call_active = false;
                StreamAction::Stop(StreamKind::Call)
            }
            InputConfig | Other(_) => return None,
        };
        Some(action)
    }

    pub fn call_active(&self) -> bool {
        self.call_active
    }

    pub fn siri_active(&self) -> bool {
        self.siri_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_audio_type_wins() {
        let mut router = StreamRouter::new();
        router.on_command(AudioCommand::PhonecallStart);
        assert_eq!(router.route_pcm(2), StreamKind::Navigation);
        assert_eq!(router.route_pcm(1), StreamKind::Call);
    }

    #[test]
    fn test_siri_then_call() {
        let mut router = StreamRouter::new();
        assert_eq!(router.route_pcm(1), StreamKind::Media);

        assert_eq!(
            router.on_command(AudioCommand::SiriStart),
            Some(StreamAction::Start(StreamKind::Voice))
        );
        assert_eq!(router.route_pcm(1), StreamKind::Voice);

        router.on_command(AudioCommand::PhonecallStart);
        assert_eq!(router.route_pcm(1), StreamKind::Call);

        router.on_command(AudioCommand::PhonecallStop);
        router.on_command(AudioCommand::SiriStop);
        assert_eq!(router.route_pcm(1), StreamKind::Media);
    }

    #[test]
    fn test_alert_maps_to_navigation() {
        let mut router = StreamRouter::new();
        assert_eq!(
            router.on_command(AudioCommand::AlertStop),
            Some(StreamAction::Stop(StreamKind::Navigation))
        );
        assert_eq!(router.on_command(AudioCommand::InputConfig), None);
    }
}

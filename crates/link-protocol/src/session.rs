//! Session lifecycle state

use serde::{Deserialize, Serialize};

/// Session state
///
/// A session moves strictly forward. `Disconnected` is terminal; reconnecting
/// requires a new session object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, not started
    Idle,
    /// `start()` called, waiting for the transport
    Connecting,
    /// Init sequence being sent
    Initializing,
    /// Init sequence sent, payload flowing
    Streaming,
    /// Stopped or declared dead
    Disconnected,
}

impl SessionState {
    /// Check whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Initializing)
                | (Initializing, Streaming)
                | (Idle | Connecting | Initializing | Streaming, Disconnected)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Disconnected
    }

    /// Check if the session has been started and not yet stopped
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Initializing | SessionState::Streaming
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Initializing => "initializing",
            SessionState::Streaming => "streaming",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Disconnected));
    }

    #[test]
    fn test_disconnected_is_terminal() {
        use SessionState::*;
        for next in [Idle, Connecting, Initializing, Streaming, Disconnected] {
            assert!(!Disconnected.can_transition_to(next));
        }
        assert!(!Streaming.can_transition_to(Initializing));
        assert!(!Idle.can_transition_to(Streaming));
    }
}

//! Session notification trait

use link_protocol::{Message, SessionState, VideoFrameInfo};

use crate::SessionError;

/// Callbacks out of a running session
///
/// Messages, decode errors and video notifications arrive on the ingress
/// thread. Liveness errors arrive on the timer thread. State changes arrive
/// on whichever thread caused them. Implementations marshal to their own
/// context if they need to.
pub trait SessionEvents: Send + Sync {
    fn on_message(&self, _message: &Message) {}

    fn on_video_frame(&self, _info: &VideoFrameInfo) {}

    fn on_error(&self, _error: &SessionError) {}

    /// Delivered in order once the controller lock is released; may call `stop()`
    fn on_state_changed(&self, _state: SessionState) {}

    /// Ingress loop has exited; no more messages follow
    fn on_read_loop_stopped(&self) {}
}

/// Ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl SessionEvents for NoopEvents {}

//! Session engine for the Carlink adapter
//!
//! Drives the session lifecycle over a [`link_transport::Transport`]:
//! init sequence, heartbeat and liveness watchdog, and the ingress read loop
//! that feeds the video sink and the audio mixer.

mod controller;
mod error;
mod events;
mod heartbeat;
mod init;
mod options;
mod router;
mod video;

pub use controller::*;
pub use error::*;
pub use events::*;
pub use heartbeat::*;
pub use init::*;
pub use options::*;
pub use router::*;
pub use video::*;

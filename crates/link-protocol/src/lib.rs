//! Wire protocol for the Carlink USB projection adapter
//!
//! This crate contains the frame codec, the typed message catalog and the
//! configuration/state types shared by every other crate in the driver.

mod audio;
mod command;
mod config;
mod error;
mod header;
mod messages;
mod session;

pub use audio::*;
pub use command::*;
pub use config::*;
pub use error::*;
pub use header::*;
pub use messages::*;
pub use session::*;

/// Magic value opening every frame header
pub const MAGIC: u32 = 0x55AA_55AA;

/// Fixed size of a frame header in bytes
pub const HEADER_SIZE: usize = 16;

/// Largest payload a header may declare (1 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 1_048_576;

/// Bytes of per-frame metadata preceding the H.264 data in a video payload
pub const VIDEO_PREFIX_SIZE: usize = 20;

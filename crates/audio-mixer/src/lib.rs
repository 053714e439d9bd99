//! Multi-stream audio buffering for the adapter link
//!
//! Each logical stream (media, navigation, voice, call) gets its own ring
//! buffer and output sink. The ingress thread writes PCM, a dedicated drain
//! thread moves it into the sinks once pre-fill is satisfied.

mod error;
mod mixer;
mod profile;
mod ring_buffer;
mod routing;
mod traits;

pub use error::*;
pub use mixer::*;
pub use profile::*;
pub use ring_buffer::*;
pub use routing::*;
pub use traits::*;

/// Default duck factor applied to media while navigation or voice plays
pub const DEFAULT_DUCK_FACTOR: f32 = 0.2;

/// Buffered audio below this level counts as "nothing left" for stop handling
pub const TRIVIAL_FILL_MS: u64 = 10;

//! Byte transport for the adapter link
//!
//! The session only needs a blocking read/write pair with timeouts. Real
//! deployments wrap a USB bulk endpoint; [`MemoryTransport`] is the in-process
//! pair used by tests and the simulator.

mod error;
mod memory;
mod traits;

pub use error::*;
pub use memory::*;
pub use traits::*;

/// Channel depth of one direction of a [`MemoryTransport`] pair
pub const MEMORY_CHANNEL_DEPTH: usize = 1024;

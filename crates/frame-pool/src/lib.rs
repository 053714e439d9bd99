//! Resolution-aware buffer pool for the ingress path
//!
//! Buffers live in three capacity buckets. The number of pooled buffers and
//! the size of the large bucket scale with the display resolution, so the
//! pool is reconfigured whenever a new session starts.

mod pool;
mod sizing;

pub use pool::*;
pub use sizing::*;

/// Upper capacity of the small bucket (64 KiB)
pub const SMALL_BUFFER_THRESHOLD: usize = 64 * 1024;

/// Upper capacity of the medium bucket (256 KiB)
pub const MEDIUM_BUFFER_THRESHOLD: usize = 256 * 1024;

/// Minimum size of a buffer allocated on a pool miss
pub const EXPANSION_MIN_SIZE: usize = 128 * 1024;

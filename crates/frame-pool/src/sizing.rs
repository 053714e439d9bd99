//! Pool sizing from display resolution

use crate::{MEDIUM_BUFFER_THRESHOLD, SMALL_BUFFER_THRESHOLD};

const PIXELS_800X480: u64 = 800 * 480;
const PIXELS_1024X600: u64 = 1024 * 600;
const PIXELS_1080P: u64 = 1920 * 1080;
const PIXELS_2400X960: u64 = 2400 * 960;
const PIXELS_4K: u64 = 3840 * 2160;

/// Smallest pool, for 800x480 class displays
pub const MIN_POOL_SIZE: usize = 6;

/// Largest pool, for displays above 4K
pub const MAX_POOL_SIZE: usize = 20;

/// Largest buffer kept in the large bucket
pub const MAX_LARGE_BUFFER_SIZE: usize = 1024 * 1024;

/// Size class of a pooled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Small,
    Medium,
    Large,
}

impl Bucket {
    /// Bucket serving a request of `size` bytes
    pub fn for_size(size: usize) -> Self {
        if size <= SMALL_BUFFER_THRESHOLD {
            Bucket::Small
        } else if size <= MEDIUM_BUFFER_THRESHOLD {
            Bucket::Medium
        } else {
            Bucket::Large
        }
    }

    /// Next larger bucket to fall back to on a miss
    pub fn next_larger(self) -> Option<Bucket> {
        match self {
            Bucket::Small => Some(Bucket::Medium),
            Bucket::Medium => Some(Bucket::Large),
            Bucket::Large => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Bucket::Small => "small",
            Bucket::Medium => "medium",
            Bucket::Large => "large",
        }
    }
}

/// Derived pool layout for one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSizing {
    pub width: u32,
    pub height: u32,
    /// Total buffers across all buckets
    pub pool_size: usize,
    pub small_count: usize,
    pub medium_count: usize,
    pub large_count: usize,
    /// Capacity of each buffer in the large bucket
    pub large_buffer_size: usize,
}

impl PoolSizing {
    pub fn for_resolution(width: u32, height: u32) -> Self {
        let pool_size = pool_size_for(width, height);
        let small_count = pool_size / 3;
        let medium_count = pool_size / 3;

        Self {
            width,
            height,
            pool_size,
            small_count,
            medium_count,
            large_count: pool_size - small_count - medium_count,
            large_buffer_size: frame_buffer_size_for(width, height)
                .clamp(MEDIUM_BUFFER_THRESHOLD, MAX_LARGE_BUFFER_SIZE),
        }
    }

    /// Number of buffers `bucket` may hold
    pub fn share(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Small => self.small_count,
            Bucket::Medium => self.medium_count,
            Bucket::Large => self.large_count,
        }
    }

    /// Capacity of the buffers preallocated into `bucket`
    pub fn buffer_size(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Small => SMALL_BUFFER_THRESHOLD,
            Bucket::Medium => MEDIUM_BUFFER_THRESHOLD,
            Bucket::Large => self.large_buffer_size,
        }
    }
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self::for_resolution(800, 480)
    }
}

/// Total pooled buffers for a display resolution
pub fn pool_size_for(width: u32, height: u32) -> usize {
    let pixels = width as u64 * height as u64;

    if pixels <= PIXELS_800X480 {
        MIN_POOL_SIZE
    } else if pixels <= PIXELS_1024X600 {
        8
    } else if pixels <= PIXELS_1080P {
        10
    } else if pixels <= PIXELS_2400X960 {
        12
    } else if pixels <= PIXELS_4K {
        16
    } else {
        MAX_POOL_SIZE
    }
}

/// Per-frame buffer size for a display resolution
///
/// Assumes roughly 10:1 H.264 compression of a 4-byte-per-pixel frame, with
/// a floor per resolution class.
pub fn frame_buffer_size_for(width: u32, height: u32) -> usize {
    let pixels = width as u64 * height as u64;
    let base = (pixels * 4 / 10) as usize;

    let floor = if pixels <= PIXELS_800X480 {
        64 * 1024
    } else if pixels <= PIXELS_1080P {
        128 * 1024
    } else if pixels <= PIXELS_2400X960 {
        256 * 1024
    } else if pixels <= PIXELS_4K {
        512 * 1024
    } else {
        1024 * 1024
    };

    base.max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_table() {
        assert_eq!(pool_size_for(800, 480), 6);
        assert_eq!(pool_size_for(1024, 600), 8);
        assert_eq!(pool_size_for(1280, 720), 10);
        assert_eq!(pool_size_for(1920, 1080), 10);
        assert_eq!(pool_size_for(2400, 960), 12);
        assert_eq!(pool_size_for(3840, 2160), 16);
        assert_eq!(pool_size_for(7680, 4320), 20);
    }

    #[test]
    fn test_bucket_split() {
        let sizing = PoolSizing::for_resolution(1920, 1080);
        assert_eq!(sizing.pool_size, 10);
        assert_eq!(
            (sizing.small_count, sizing.medium_count, sizing.large_count),
            (3, 3, 4)
        );
    }

    #[test]
    fn test_large_buffer_bounds() {
        // 800x480 computes 150 KiB, clamped up into the large class
        assert_eq!(
            PoolSizing::for_resolution(800, 480).large_buffer_size,
            MEDIUM_BUFFER_THRESHOLD
        );
        // 2400x960 computes 921600 bytes
        assert_eq!(frame_buffer_size_for(2400, 960), 921_600);
        assert_eq!(PoolSizing::for_resolution(2400, 960).large_buffer_size, 921_600);
        // 4K computes above 1 MiB and is capped
        assert_eq!(
            PoolSizing::for_resolution(3840, 2160).large_buffer_size,
            MAX_LARGE_BUFFER_SIZE
        );
    }

    #[test]
    fn test_bucket_for_size() {
        assert_eq!(Bucket::for_size(0), Bucket::Small);
        assert_eq!(Bucket::for_size(SMALL_BUFFER_THRESHOLD), Bucket::Small);
        assert_eq!(Bucket::for_size(SMALL_BUFFER_THRESHOLD + 1), Bucket::Medium);
        assert_eq!(Bucket::for_size(MEDIUM_BUFFER_THRESHOLD + 1), Bucket::Large);
    }
}

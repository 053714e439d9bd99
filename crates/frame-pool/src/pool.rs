//! Size-bucketed buffer pool

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{Bucket, EXPANSION_MIN_SIZE, PoolSizing};

/// Buffer borrowed from a [`BufferPool`]
///
/// Not `Clone`: the only way back into the pool is to move it into
/// [`BufferPool::release`].
#[derive(Debug)]
pub struct PooledBuffer {
    data: Box<[u8]>,
    bucket: Bucket,
}

impl PooledBuffer {
    fn allocate(size: usize, bucket: Bucket) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
            bucket,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn bucket(&self) -> Bucket {
        self.bucket
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn wipe(&mut self) {
        self.data.fill(0);
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated, including the initial fill
    pub allocations: u64,
    /// Allocations caused by a miss in every eligible bucket
    pub expansions: u64,
    /// Acquires served from a bucket
    pub reuses: u64,
    /// Releases dropped because the bucket was at its share
    pub discards: u64,
    /// Buffers currently held by borrowers
    pub outstanding: u64,
    pub free_small: usize,
    pub free_medium: usize,
    pub free_large: usize,
}

#[derive(Default)]
struct PoolInner {
    sizing: PoolSizing,
    initialized: bool,
    small: Vec<PooledBuffer>,
    medium: Vec<PooledBuffer>,
    large: Vec<PooledBuffer>,
    stats: PoolStats,
}

impl PoolInner {
    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<PooledBuffer> {
        match bucket {
            Bucket::Small => &mut self.small,
            Bucket::Medium => &mut self.medium,
            Bucket::Large => &mut self.large,
        }
    }

    fn initialize(&mut self) {
        if self.initialized {
            return;
        }

        let sizing = self.sizing;
        for bucket in [Bucket::Small, Bucket::Medium, Bucket::Large] {
            let size = sizing.buffer_size(bucket);
            let count = sizing.share(bucket);
            let buffers = self.bucket_mut(bucket);
            buffers.clear();
            buffers.extend((0..count).map(|_| PooledBuffer::allocate(size, bucket)));
            self.stats.allocations += count as u64;
        }

        self.initialized = true;
        info!(
            width = sizing.width,
            height = sizing.height,
            pool_size = sizing.pool_size,
            small = sizing.small_count,
            medium = sizing.medium_count,
            large = sizing.large_count,
            large_kb = sizing.large_buffer_size / 1024,
            "Buffer pool initialized"
        );
    }

    /// Pop a buffer of at least `min_size` from `bucket`
    fn take_from(&mut self, bucket: Bucket, min_size: usize) -> Option<PooledBuffer> {
        let buffers = self.bucket_mut(bucket);
        let index = buffers.iter().rposition(|b| b.capacity() >= min_size)?;
        Some(buffers.swap_remove(index))
    }
}

/// Resolution-aware pool of reusable byte buffers
///
/// `acquire` and `release` are the only mutation points, both under one
/// lock. The pool fills itself lazily on first use after `configure` or
/// `reset`.
pub struct BufferPool {
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    /// Create a pool sized for 800x480 until configured
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub fn with_resolution(width: u32, height: u32) -> Self {
        let pool = Self::new();
        pool.configure(width, height);
        pool
    }

    /// Size the pool for a display resolution
    ///
    /// Drops pooled buffers so the next acquire refills for the new layout.
    pub fn configure(&self, width: u32, height: u32) {
        let mut inner = self.inner.lock();
        inner.sizing = PoolSizing::for_resolution(width, height);
        inner.small.clear();
        inner.medium.clear();
        inner.large.clear();
        inner.initialized = false;
        debug!(width, height, "Buffer pool configured");
    }

    pub fn sizing(&self) -> PoolSizing {
        self.inner.lock().sizing
    }

    /// Borrow a zeroed buffer with capacity of at least `min_size`
    ///
    /// Tries the bucket for `min_size`, then the next larger one, then
    /// allocates a fresh buffer.
    pub fn acquire(&self, min_size: usize) -> PooledBuffer {
        let mut inner = self.inner.lock();
        inner.initialize();

        let wanted = Bucket::for_size(min_size);
        let pooled = inner.take_from(wanted, min_size).or_else(|| {
            wanted
                .next_larger()
                .and_then(|larger| inner.take_from(larger, min_size))
        });

        let mut buffer = match pooled {
            Some(buffer) => {
                inner.stats.reuses += 1;
                buffer
            }
            None => {
                let size = min_size.max(EXPANSION_MIN_SIZE);
                inner.stats.allocations += 1;
                inner.stats.expansions += 1;
                debug!(
                    size_kb = size / 1024,
                    requested_kb = min_size / 1024,
                    "POOL_EXPAND: allocated buffer on pool miss"
                );
                PooledBuffer::allocate(size, Bucket::for_size(size))
            }
        };
        inner.stats.outstanding += 1;
        drop(inner);

        buffer.wipe();
        buffer
    }

    /// Return a buffer to its bucket, or drop it if the bucket is full
    pub fn release(&self, mut buffer: PooledBuffer) {
        buffer.wipe();

        let mut inner = self.inner.lock();
        inner.stats.outstanding = inner.stats.outstanding.saturating_sub(1);

        let bucket = buffer.bucket();
        let share = inner.sizing.share(bucket);
        let capacity = buffer.capacity();

        if inner.bucket_mut(bucket).len() < share {
            inner.bucket_mut(bucket).push(buffer);
        } else {
            inner.stats.discards += 1;
            debug!(
                bucket = bucket.name(),
                size_kb = capacity / 1024,
                "POOL_FULL: bucket at capacity, discarding buffer"
            );
        }
    }

    /// Borrow a buffer that returns itself to the pool when dropped
    pub fn lease(&self, min_size: usize) -> BufferLease<'_> {
        BufferLease {
            pool: self,
            buffer: Some(self.acquire(min_size)),
        }
    }

    /// Drop every pooled buffer and mark the pool for re-initialization
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let cleared = inner.small.len() + inner.medium.len() + inner.large.len();
        inner.small.clear();
        inner.medium.clear();
        inner.large.clear();
        inner.initialized = false;
        debug!(cleared, "Buffer pool reset");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            free_small: inner.small.len(),
            free_medium: inner.medium.len(),
            free_large: inner.large.len(),
            ..inner.stats
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII borrow of a pooled buffer
///
/// The buffer goes back to the pool on drop, whatever path the borrower
/// leaves through.
pub struct BufferLease<'a> {
    pool: &'a BufferPool,
    buffer: Option<PooledBuffer>,
}

impl BufferLease<'_> {
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, PooledBuffer::capacity)
    }

    /// Take the buffer out, leaving release to the caller
    pub fn detach(mut self) -> Option<PooledBuffer> {
        self.buffer.take()
    }
}

impl Deref for BufferLease<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.buffer.as_ref() {
            Some(buffer) => buffer.as_slice(),
            None => &[],
        }
    }
}

impl DerefMut for BufferLease<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MEDIUM_BUFFER_THRESHOLD, SMALL_BUFFER_THRESHOLD};

    #[test]
    fn test_lazy_initialization() {
        let pool = BufferPool::with_resolution(800, 480);
        assert!(!pool.is_initialized());

        let buffer = pool.acquire(1024);
        assert!(pool.is_initialized());
        assert_eq!(pool.stats().allocations, 6);
        pool.release(buffer);
    }

    #[test]
    fn test_release_then_acquire_reuses() {
        let pool = BufferPool::with_resolution(1920, 1080);

        let buffer = pool.acquire(10_000);
        assert!(buffer.capacity() >= 10_000);
        pool.release(buffer);

        let allocations = pool.stats().allocations;
        for _ in 0..50 {
            let buffer = pool.acquire(10_000);
            assert!(buffer.capacity() >= 10_000);
            pool.release(buffer);
        }
        let stats = pool.stats();
        assert_eq!(stats.allocations, allocations);
        assert_eq!(stats.expansions, 0);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn test_fallback_to_larger_bucket() {
        let pool = BufferPool::with_resolution(800, 480);
        // Drain the two small buffers
        let a = pool.acquire(100);
        let b = pool.acquire(100);
        assert_eq!(a.bucket(), Bucket::Small);

        let c = pool.acquire(100);
        assert_eq!(c.bucket(), Bucket::Medium);
        assert_eq!(pool.stats().expansions, 0);

        for buffer in [a, b, c] {
            pool.release(buffer);
        }
    }

    #[test]
    fn test_expansion_and_discard() {
        let pool = BufferPool::with_resolution(800, 480);
        let held: Vec<_> = (0..4).map(|_| pool.acquire(100)).collect();
        assert_eq!(pool.stats().expansions, 0);

        // Small and medium buckets are empty now
        let extra = pool.acquire(100);
        let stats = pool.stats();
        assert_eq!(stats.expansions, 1);
        assert!(extra.capacity() >= EXPANSION_MIN_SIZE);

        for buffer in held {
            pool.release(buffer);
        }
        // Medium bucket is back at its share, so the extra medium-class buffer is dropped
        pool.release(extra);
        let stats = pool.stats();
        assert_eq!(stats.discards, 1);
        assert_eq!(stats.free_medium, 2);
    }

    #[test]
    fn test_buffers_are_zeroed() {
        let pool = BufferPool::new();
        let mut buffer = pool.acquire(64);
        buffer.as_mut_slice()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        pool.release(buffer);

        let buffer = pool.acquire(64);
        assert!(buffer.as_slice().iter().all(|b| *b == 0));
        pool.release(buffer);
    }

    #[test]
    fn test_lease_releases_on_drop() {
        let pool = BufferPool::new();
        {
            let mut lease = pool.lease(MEDIUM_BUFFER_THRESHOLD);
            lease[0] = 1;
            assert_eq!(pool.stats().outstanding, 1);
        }
        assert_eq!(pool.stats().outstanding, 0);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _lease = pool.lease(SMALL_BUFFER_THRESHOLD);
            panic!("handler failed");
        }));
        assert!(result.is_err());
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_oversized_request_allocates_fresh() {
        let pool = BufferPool::with_resolution(800, 480);
        let buffer = pool.acquire(900 * 1024);
        assert!(buffer.capacity() >= 900 * 1024);
        assert_eq!(pool.stats().expansions, 1);
        // Too-small large buffers stay in their bucket
        assert_eq!(pool.stats().free_large, 2);
        pool.release(buffer);
    }

    #[test]
    fn test_reset_and_reconfigure() {
        let pool = BufferPool::with_resolution(800, 480);
        pool.release(pool.acquire(10));
        pool.reset();
        assert!(!pool.is_initialized());
        assert_eq!(pool.stats().free_small, 0);

        pool.configure(2400, 960);
        pool.release(pool.acquire(10));
        let stats = pool.stats();
        assert_eq!(stats.free_small + stats.free_medium + stats.free_large, 12);
    }
}

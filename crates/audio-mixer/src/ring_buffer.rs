//! Fixed-capacity PCM ring buffer
//!
//! ```text
//! ┌──────────┬───────────────────────┬─────────────────────────┐
//! │   free   │     buffered audio    │          free           │
//! └──────────┴───────────────────────┴─────────────────────────┘
//!            ▲                       ▲
//!          read                    write
//! ```
//!
//! Writes never block: whatever does not fit is dropped and counted as an
//! overflow. Reads that find less data than requested are counted as
//! underflows.

use link_protocol::AudioFormat;

/// Ring buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub capacity: usize,
    pub buffered: usize,
    pub total_written: u64,
    pub total_read: u64,
    pub overflow_count: u64,
    pub underflow_count: u64,
}

pub struct RingBuffer {
    data: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    len: usize,
    format: AudioFormat,
    total_written: u64,
    total_read: u64,
    overflow_count: u64,
    underflow_count: u64,
}

impl RingBuffer {
    pub fn new(capacity: usize, format: AudioFormat) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            len: 0,
            format,
            total_written: 0,
            total_read: 0,
            overflow_count: 0,
            underflow_count: 0,
        }
    }

    /// Buffer holding `ms` milliseconds of `format`
    pub fn with_duration(format: AudioFormat, ms: u64) -> Self {
        Self::new(format.bytes_for_ms(ms), format)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes currently buffered
    pub fn available(&self) -> usize {
        self.len
    }

    pub fn free_space(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Buffered audio in milliseconds
    pub fn fill_level_ms(&self) -> u64 {
        self.format.ms_for_bytes(self.len)
    }

    /// Append `src`, dropping whatever does not fit
    ///
    /// Returns bytes stored.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.free_space());
        if n < src.len() {
            self.overflow_count += 1;
        }
        if n == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = n.min(capacity - self.write_pos);
        self.data[self.write_pos..self.write_pos + first].copy_from_slice(&src[..first]);
        self.data[..n - first].copy_from_slice(&src[first..n]);

        self.write_pos = (self.write_pos + n) % capacity;
        self.len += n;
        self.total_written += n as u64;
        n
    }

    /// Move up to `dst.len()` bytes out of the buffer
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        if n < dst.len() {
            self.underflow_count += 1;
        }
        if n == 0 {
            return 0;
        }

        let capacity = self.capacity();
        let first = n.min(capacity - self.read_pos);
        dst[..first].copy_from_slice(&self.data[self.read_pos..self.read_pos + first]);
        dst[first..n].copy_from_slice(&self.data[..n - first]);

        self.read_pos = (self.read_pos + n) % capacity;
        self.len -= n;
        self.total_read += n as u64;
        n
    }

    /// Discard buffered audio, keeping counters
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.len = 0;
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            capacity: self.capacity(),
            buffered: self.len,
            total_written: self.total_written,
            total_read: self.total_read,
            overflow_count: self.overflow_count,
            underflow_count: self.underflow_count,
        }
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("format", &self.format)
            .field("capacity", &self.capacity())
            .field("buffered", &self.len)
            .finish()
    }
}

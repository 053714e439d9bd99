//! Video sink seam

use bytes::BytesMut;
use link_protocol::VideoFrameInfo;

use crate::SessionResult;

/// Writable buffer handed out by a [`VideoSink`]
///
/// The ingress router reads the frame body straight into it, then hands it
/// back through [`VideoSink::commit`].
///
/// The backing buffer keeps its initialised length across frames, so only
/// growth past the largest frame seen is zero-filled.
#[derive(Debug)]
pub struct WritableRegion {
    buf: BytesMut,
    /// Bytes of `buf` that belong to the current frame
    filled: usize,
    info: Option<VideoFrameInfo>,
}

impl WritableRegion {
    pub fn new(capacity: usize) -> Self {
        Self::from_buffer(BytesMut::with_capacity(capacity))
    }

    /// Wrap a recycled buffer; the region starts empty
    pub fn from_buffer(buf: BytesMut) -> Self {
        Self {
            buf,
            filled: 0,
            info: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Size the region to `len` bytes and expose them for writing
    ///
    /// The returned bytes may hold a previous frame; callers overwrite all of them.
    pub fn prepare(&mut self, len: usize) -> &mut [u8] {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
        self.filled = len;
        &mut self.buf[..len]
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn info(&self) -> Option<&VideoFrameInfo> {
        self.info.as_ref()
    }

    pub fn set_info(&mut self, info: VideoFrameInfo) {
        self.info = Some(info);
    }

    pub fn into_inner(mut self) -> BytesMut {
        self.buf.truncate(self.filled);
        self.buf
    }
}

/// Downstream consumer of H.264 payloads
///
/// Called from the ingress thread only.
pub trait VideoSink: Send + Sync {
    /// Hand out a region of at least `min_size` bytes
    ///
    /// An error makes the router drop the frame.
    fn acquire_input_region(&self, min_size: usize) -> SessionResult<WritableRegion>;

    /// Submit a filled region; `region.info()` carries the frame prefix
    fn commit(&self, region: WritableRegion) -> SessionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_sizes_region() {
        let mut region = WritableRegion::new(16);
        region.prepare(8).copy_from_slice(&[7; 8]);
        assert_eq!(region.len(), 8);
        assert_eq!(region.data(), &[7; 8]);

        region.prepare(4);
        assert_eq!(region.len(), 4);
        assert_eq!(region.into_inner().as_ref(), &[7; 4]);
    }

    #[test]
    fn test_recycled_buffer_skips_zero_fill() {
        let mut region = WritableRegion::new(8);
        region.prepare(8).copy_from_slice(&[3; 8]);

        // same backing bytes come back without a zeroing pass
        let mut region = WritableRegion::from_buffer(region.into_inner());
        assert!(region.is_empty());
        assert_eq!(region.prepare(6), &[3; 6]);

        // only growth is zero-filled
        assert_eq!(&region.prepare(10)[8..], &[0; 2]);
        assert_eq!(region.data().len(), 10);
    }

    #[test]
    fn test_recycled_buffer_starts_empty() {
        let mut buf = BytesMut::with_capacity(32);
        buf.extend_from_slice(b"stale");
        let region = WritableRegion::from_buffer(buf);
        assert!(region.is_empty());
        assert!(region.capacity() >= 32);
        assert!(region.info().is_none());
    }
}

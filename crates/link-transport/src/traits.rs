//! Transport trait abstraction

use std::time::Duration;

use crate::{TransportError, TransportResult};

/// Blocking byte transport with per-call timeouts
///
/// Implementations are shared between the ingress thread (reads) and the
/// timer/application threads (writes), so both halves take `&self`.
pub trait Transport: Send + Sync {
    /// Read up to `buf.len()` bytes
    ///
    /// Returns [`TransportError::Timeout`] if nothing arrived within
    /// `timeout`, and [`TransportError::ConnectionClosed`] once the link is
    /// gone. Never returns `Ok(0)` for a non-empty `buf`.
    fn read(&self, buf: &mut [u8], timeout: Duration) -> TransportResult<usize>;

    /// Write some prefix of `buf`, returning how many bytes were accepted
    fn write(&self, buf: &[u8], timeout: Duration) -> TransportResult<usize>;

    /// Close the link; pending and future calls fail with `ConnectionClosed`
    fn close(&self);

    /// Check if the link is still usable
    fn is_open(&self) -> bool;

    /// Fill `buf` completely
    ///
    /// `timeout` bounds each underlying read. A timeout before the first byte
    /// is returned to the caller; once bytes have been consumed the call keeps
    /// reading while the link is open so the stream never loses framing.
    fn read_exact(&self, buf: &mut [u8], timeout: Duration) -> TransportResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..], timeout) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(TransportError::Timeout) if filled > 0 && self.is_open() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write all of `buf`
    fn write_all(&self, buf: &[u8], timeout: Duration) -> TransportResult<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..], timeout)? {
                0 => {
                    return Err(TransportError::ShortWrite {
                        written,
                        expected: buf.len(),
                    });
                }
                n => written += n,
            }
        }
        Ok(())
    }
}

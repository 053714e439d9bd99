//! In-process transport pair

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::debug;

use crate::{MEMORY_CHANNEL_DEPTH, Transport, TransportError, TransportResult};

/// One end of an in-memory duplex byte pipe
///
/// Each `write` is delivered to the peer as one chunk; the peer may consume it
/// across several `read` calls. Closing either end closes both.
pub struct MemoryTransport {
    name: &'static str,
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    pending: Mutex<Bytes>,
    closed: Arc<AtomicBool>,
    fail_next_writes: AtomicU32,
    writes_failing: AtomicBool,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

impl MemoryTransport {
    /// Create a connected pair: `(host, device)`
    pub fn pair() -> (Self, Self) {
        let (host_tx, device_rx) = bounded(MEMORY_CHANNEL_DEPTH);
        let (device_tx, host_rx) = bounded(MEMORY_CHANNEL_DEPTH);
        let closed = Arc::new(AtomicBool::new(false));

        (
            Self::new("host", host_tx, host_rx, closed.clone()),
            Self::new("device", device_tx, device_rx, closed),
        )
    }

    fn new(
        name: &'static str,
        tx: Sender<Bytes>,
        rx: Receiver<Bytes>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name,
            tx,
            rx,
            pending: Mutex::new(Bytes::new()),
            closed,
            fail_next_writes: AtomicU32::new(0),
            writes_failing: AtomicBool::new(false),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        }
    }

    /// Make the next `count` writes fail with [`TransportError::Write`]
    pub fn inject_write_failures(&self, count: u32) {
        self.fail_next_writes.fetch_add(count, Ordering::SeqCst);
    }

    /// Make every write fail until switched off again
    pub fn set_writes_failing(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    fn take_injected_failure(&self) -> bool {
        if self.writes_failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn copy_out(&self, chunk: &mut Bytes, buf: &mut [u8]) -> usize {
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk.split_to(n));
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        n
    }
}

impl Transport for MemoryTransport {
    fn read(&self, buf: &mut [u8], timeout: Duration) -> TransportResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            return Ok(self.copy_out(&mut pending, buf));
        }

        // Data already queued by the peer is still delivered after close
        let received = match self.rx.try_recv() {
            Ok(chunk) => Ok(chunk),
            Err(_) if self.closed.load(Ordering::SeqCst) => {
                return Err(TransportError::ConnectionClosed);
            }
            Err(_) => self.rx.recv_timeout(timeout),
        };

        match received {
            Ok(mut chunk) => {
                let n = self.copy_out(&mut chunk, buf);
                *pending = chunk;
                Ok(n)
            }
            Err(RecvTimeoutError::Timeout) => {
                if self.closed.load(Ordering::SeqCst) {
                    Err(TransportError::ConnectionClosed)
                } else {
                    Err(TransportError::Timeout)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ConnectionClosed),
        }
    }

    fn write(&self, buf: &[u8], timeout: Duration) -> TransportResult<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.take_injected_failure() {
            return Err(TransportError::Write(format!(
                "{}: injected write failure",
                self.name
            )));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let chunk = Bytes::copy_from_slice(buf);
        let result = match self.tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(chunk)) => self
                .tx
                .send_timeout(chunk, timeout)
                .map_err(|e| {
                    if e.is_timeout() {
                        TransportError::Timeout
                    } else {
                        TransportError::ConnectionClosed
                    }
                }),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::ConnectionClosed),
        };

        result?;
        self.bytes_written
            .fetch_add(buf.len() as u64, Ordering::Relaxed);
        Ok(buf.len())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(end = self.name, "Memory transport closed");
        }
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn test_chunk_split_across_reads() {
        let (host, device) = MemoryTransport::pair();
        device.write_all(&[1, 2, 3, 4, 5, 6], TIMEOUT).unwrap();

        let mut first = [0u8; 4];
        host.read_exact(&mut first, TIMEOUT).unwrap();
        assert_eq!(first, [1, 2, 3, 4]);

        let mut rest = [0u8; 2];
        host.read_exact(&mut rest, TIMEOUT).unwrap();
        assert_eq!(rest, [5, 6]);
        assert_eq!(host.bytes_read(), 6);
    }

    #[test]
    fn test_read_exact_joins_chunks() {
        let (host, device) = MemoryTransport::pair();
        device.write_all(&[1, 2], TIMEOUT).unwrap();
        device.write_all(&[3, 4, 5], TIMEOUT).unwrap();

        let mut buf = [0u8; 5];
        host.read_exact(&mut buf, TIMEOUT).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_idle_read_times_out() {
        let (host, _device) = MemoryTransport::pair();
        let mut buf = [0u8; 16];
        assert!(matches!(
            host.read(&mut buf, Duration::from_millis(5)),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_close_drains_then_fails() {
        let (host, device) = MemoryTransport::pair();
        device.write_all(&[7, 7], TIMEOUT).unwrap();
        device.close();

        assert!(!host.is_open());
        let mut buf = [0u8; 2];
        host.read_exact(&mut buf, TIMEOUT).unwrap();
        assert_eq!(buf, [7, 7]);
        assert!(matches!(
            host.read(&mut buf, TIMEOUT),
            Err(TransportError::ConnectionClosed)
        ));
        assert!(matches!(
            host.write(&[1], TIMEOUT),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_injected_write_failures() {
        let (host, device) = MemoryTransport::pair();
        host.inject_write_failures(2);

        assert!(matches!(host.write(&[1], TIMEOUT), Err(TransportError::Write(_))));
        assert!(matches!(host.write(&[1], TIMEOUT), Err(TransportError::Write(_))));
        assert_eq!(host.write(&[9], TIMEOUT).unwrap(), 1);

        let mut buf = [0u8; 1];
        device.read_exact(&mut buf, TIMEOUT).unwrap();
        assert_eq!(buf, [9]);
    }
}

// ============================================
// File: crates/kestrel-transport/src/memory.rs
// ============================================
//! # In-Memory Crypto Stream
//!
//! ## Creation Reason
//! Lets a client and a server crypto setup handshake with each other in a
//! single process: tests, benchmarks and loopback connections.
//!
//! ## Main Functionality
//! - `MemoryCryptoStream::pair()` returns two connected ends
//! - Bytes written on one end are read on the other, in order
//! - Dropping or closing an end makes the peer read `Ok(0)`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Each direction is bounded by `MAX_BUFFERED_BYTES`
//! - One reader per end; wake-ups use `Notify::notify_one` permits
//!
//! ## Last Modified
//! v0.1.0 - Initial in-memory stream

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::CryptoStream;

/// Maximum number of bytes queued in one direction.
pub const MAX_BUFFERED_BYTES: usize = 64 * 1024;

// ============================================
// Pipe
// ============================================

/// One direction of the stream.
#[derive(Debug, Default)]
struct Pipe {
    buffer: Mutex<VecDeque<u8>>,
    closed: AtomicBool,
    readable: Notify,
}

impl Pipe {
    fn push(&self, data: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::StreamClosed);
        }
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() + data.len() > MAX_BUFFERED_BYTES {
                return Err(TransportError::BufferFull {
                    pending: buffer.len(),
                    limit: MAX_BUFFERED_BYTES,
                });
            }
            buffer.extend(data);
        }
        self.readable.notify_one();
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.readable.notify_one();
    }
}

// ============================================
// MemoryCryptoStream
// ============================================

/// One end of an in-memory crypto stream pair.
///
/// # Example
/// ```
/// use kestrel_transport::{CryptoStream, MemoryCryptoStream};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (mut client, mut server) = MemoryCryptoStream::pair();
/// client.write_all(b"hello").await?;
///
/// let mut buf = [0u8; 16];
/// let n = server.read(&mut buf).await?;
/// assert_eq!(&buf[..n], b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryCryptoStream {
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
}

impl MemoryCryptoStream {
    /// Creates two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());
        let a = Self {
            inbound: Arc::clone(&b_to_a),
            outbound: Arc::clone(&a_to_b),
        };
        let b = Self {
            inbound: a_to_b,
            outbound: b_to_a,
        };
        (a, b)
    }

    /// Number of bytes waiting to be read on this end.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inbound.buffer.lock().len()
    }
}

#[async_trait]
impl CryptoStream for MemoryCryptoStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            {
                let mut buffer = self.inbound.buffer.lock();
                if !buffer.is_empty() {
                    let n = buf.len().min(buffer.len());
                    for (slot, byte) in buf.iter_mut().zip(buffer.drain(..n)) {
                        *slot = byte;
                    }
                    trace!(bytes = n, "Memory crypto stream read");
                    return Ok(n);
                }
            }
            if self.inbound.closed.load(Ordering::Acquire) {
                return Ok(0);
            }
            self.inbound.readable.notified().await;
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.outbound.push(data)?;
        trace!(bytes = data.len(), "Memory crypto stream write");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.outbound.close();
        Ok(())
    }
}

impl Drop for MemoryCryptoStream {
    fn drop(&mut self) {
        self.outbound.close();
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_transfers_bytes_in_order() {
        let (mut a, mut b) = MemoryCryptoStream::pair();
        a.write_all(b"first ").await.unwrap();
        a.write_all(b"second").await.unwrap();
        assert_eq!(b.pending(), 12);

        let mut buf = [0u8; 32];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"first second");
    }

    #[tokio::test]
    async fn test_partial_reads() {
        let (mut a, mut b) = MemoryCryptoStream::pair();
        a.write_all(b"abcdef").await.unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(b.read(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(b.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[tokio::test]
    async fn test_reader_wakes_on_write() {
        let (mut a, mut b) = MemoryCryptoStream::pair();
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let n = b.read(&mut buf).await.unwrap();
            buf[..n].to_vec()
        });
        tokio::task::yield_now().await;
        a.write_all(b"late").await.unwrap();
        assert_eq!(reader.await.unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_close_and_drop_signal_eof() {
        let (mut a, mut b) = MemoryCryptoStream::pair();
        a.write_all(b"x").await.unwrap();
        a.close().await.unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).await.unwrap(), 1);
        assert_eq!(b.read(&mut buf).await.unwrap(), 0);
        assert!(matches!(
            a.write_all(b"y").await,
            Err(TransportError::StreamClosed)
        ));

        drop(b);
        assert_eq!(a.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let (mut a, _b) = MemoryCryptoStream::pair();
        let chunk = vec![0u8; MAX_BUFFERED_BYTES];
        a.write_all(&chunk).await.unwrap();
        assert!(matches!(
            a.write_all(b"overflow").await,
            Err(TransportError::BufferFull { .. })
        ));
    }
}

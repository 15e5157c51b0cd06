// ============================================
// File: crates/kestrel-transport/src/io.rs
// ============================================
//! # Tokio I/O Adapter
//!
//! Wraps any `AsyncRead + AsyncWrite` (a TCP stream, a QUIC-style reliable
//! stream, `tokio::io::duplex`) as a [`CryptoStream`].
//!
//! ## Last Modified
//! v0.1.0 - Initial adapter

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Result, TransportError};
use crate::traits::CryptoStream;

/// [`CryptoStream`] over a tokio I/O object.
#[derive(Debug)]
pub struct IoCryptoStream<T> {
    inner: T,
}

impl<T> IoCryptoStream<T> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Returns the wrapped I/O object.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T> CryptoStream for IoCryptoStream<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner
            .read(buf)
            .await
            .map_err(|e| TransportError::io("crypto stream read", e))
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner
            .write_all(data)
            .await
            .map_err(|e| TransportError::io("crypto stream write", e))?;
        self.inner
            .flush()
            .await
            .map_err(|e| TransportError::io("crypto stream flush", e))
    }

    async fn close(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| TransportError::io("crypto stream shutdown", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplex_adapter() {
        let (a, b) = tokio::io::duplex(64);
        let mut a = IoCryptoStream::new(a);
        let mut b = IoCryptoStream::new(b);

        a.write_all(b"handshake").await.unwrap();
        let mut buf = [0u8; 16];
        let n = b.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"handshake");

        a.close().await.unwrap();
        assert_eq!(b.read(&mut buf).await.unwrap(), 0);
    }
}

// ============================================
// File: crates/kestrel-transport/src/traits.rs
// ============================================
//! # Crypto Stream Trait
//!
//! ## Creation Reason
//! The handshake handler in `kestrel-core` only needs two operations from
//! the transport: read whatever handshake bytes have arrived and write
//! response bytes. Keeping that behind a trait lets tests drive a full
//! client/server handshake without sockets.
//!
//! ## Design Philosophy
//! - Async with `async_trait`, like every I/O seam in the workspace
//! - `&mut self`: the handshake owns the stream exclusively while it runs
//! - Message framing is the caller's job; this is a plain byte stream
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definition

use async_trait::async_trait;

use crate::error::Result;

/// Byte-oriented, ordered, reliable handshake channel.
///
/// # Example
/// ```ignore
/// async fn echo<S: CryptoStream>(stream: &mut S) -> Result<()> {
///     let mut buf = [0u8; 512];
///     let n = stream.read(&mut buf).await?;
///     stream.write_all(&buf[..n]).await
/// }
/// ```
#[async_trait]
pub trait CryptoStream: Send {
    /// Reads available bytes into `buf`.
    ///
    /// Waits until at least one byte is available. Returns `Ok(0)` once the
    /// peer has closed the stream and everything buffered was consumed.
    ///
    /// # Errors
    /// Returns error if the underlying stream failed.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `data`.
    ///
    /// # Errors
    /// Returns `StreamClosed` if the stream was closed, or an I/O error.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Closes the write half. Further reads on the peer return `Ok(0)`.
    ///
    /// # Errors
    /// Returns error if flushing the stream fails.
    async fn close(&mut self) -> Result<()>;
}

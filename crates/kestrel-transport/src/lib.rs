// ============================================
// File: crates/kestrel-transport/src/lib.rs
// ============================================
//! # Kestrel Transport - Crypto Stream Plumbing
//!
//! ## Creation Reason
//! The handshake runs over a byte-oriented "crypto stream" that the
//! transport owns. This crate defines that seam so the crypto core can be
//! driven by a real connection stream or by an in-memory pipe in tests.
//!
//! ## Main Functionality
//! - [`traits`]: the `CryptoStream` trait
//! - [`memory`]: `MemoryCryptoStream`, a connected in-memory pair
//! - [`io`]: `IoCryptoStream`, adapter over any tokio `AsyncRead + AsyncWrite`
//! - [`error`]: `TransportError`
//!
//! ## Data Flow
//! ```text
//! ┌────────────────────┐      bytes       ┌────────────────────┐
//! │ handshake handler  │ ◄──────────────► │   CryptoStream     │
//! │  (kestrel-core)    │                  │ (this crate)       │
//! └────────────────────┘                  └─────────┬──────────┘
//!                                                   │
//!                                          transport-owned stream
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A read of 0 bytes means the peer closed the stream
//! - Implementations must be `Send` so the handshake can run on any task
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto stream abstractions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod io;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use io::IoCryptoStream;
pub use memory::MemoryCryptoStream;
pub use traits::CryptoStream;

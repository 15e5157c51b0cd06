// ============================================
// File: crates/kestrel-common/src/lib.rs
// ============================================
//! # Kestrel Common - Shared Building Blocks
//!
//! ## Creation Reason
//! Holds the identifiers, time helpers and base error type that every
//! other kestrel crate agrees on, so the crypto core and the session layer
//! never disagree about what a connection id or packet number is.
//!
//! ## Main Functionality
//! - [`types`]: `ConnectionId`, `PacketNumber`, `Perspective`
//! - [`time`]: `AtomicInstant` for lock-free activity tracking, `Timestamp`
//! - [`error`]: `CommonError` and the crate `Result` alias
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                kestrel-session                      │
//! │                      │                              │
//! │                      ▼                              │
//! │                kestrel-core                         │
//! │                      │                              │
//! │                      ▼                              │
//! │              kestrel-transport                      │
//! │                      │                              │
//! │                      ▼                              │
//! │               kestrel-common  ◄── You are here      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Leaf crate: no internal dependencies, keep external ones minimal
//! - Packet numbers feed AEAD nonces; never add wrapping arithmetic here
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

pub use error::{CommonError, Result};
pub use types::{ConnectionId, PacketNumber, Perspective};

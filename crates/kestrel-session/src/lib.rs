// ============================================
// File: crates/kestrel-session/src/lib.rs
// ============================================
//! # Kestrel Session Library
//!
//! ## Creation Reason
//! The crypto core protects packets for one connection. This crate puts
//! connections around it: packet headers, packet numbers, duplicate
//! detection, client and server sessions, a registry and an endpoint
//! configured from TOML.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Endpoint configuration management
//! - [`logging`]: Tracing subscriber setup
//! - [`packet`]: Public packet header codec
//! - [`replay`]: Sliding-window duplicate detection
//! - [`connection`]: One protected connection and its events
//! - [`session`]: Client and server sessions
//! - [`registry`]: Live connections by id
//! - [`endpoint`]: Shared keys, config and registry
//! - [`error`]: Session-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Endpoint                           │
//! │  ┌────────────┐   ┌────────────────┐   ┌────────────────┐   │
//! │  │   Config   │   │ Identity / Key │   │    Registry    │   │
//! │  └────────────┘   └────────────────┘   └───────┬────────┘   │
//! │                                                │            │
//! │              ┌──────────────────┬──────────────┘            │
//! │              ▼                  ▼                           │
//! │       ┌─────────────┐    ┌─────────────┐                    │
//! │       │ClientSession│    │ServerSession│                    │
//! │       └──────┬──────┘    └──────┬──────┘                    │
//! │              └───────┬──────────┘                           │
//! │                      ▼                                      │
//! │               ┌────────────┐      ┌──────────────────────┐  │
//! │               │ Connection │ ───► │ CryptoSetup (core)   │  │
//! │               └────────────┘      └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - No socket I/O lives here; callers move the packet bytes
//! - Configuration changes require a new `Endpoint`
//!
//! ## Last Modified
//! v0.1.0 - Initial session library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod packet;
pub mod registry;
pub mod replay;
pub mod session;

// Re-export primary types
pub use config::EndpointConfig;
pub use connection::{Connection, ConnectionEvent};
pub use endpoint::Endpoint;
pub use error::{Result, SessionError};
pub use packet::{IncomingPacket, OutgoingPacket, PacketHeader};
pub use registry::ConnectionRegistry;
pub use session::{ClientSession, ServerSession, Session};

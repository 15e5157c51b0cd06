// ============================================
// File: crates/kestrel-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the encryption levels and the handshake wire protocol spoken
//! on the crypto stream.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`encryption_level`]: ordered protection levels
//! - [`messages`]: handshake message structures
//! - [`codec`]: binary encoding and length-prefixed framing
//! - [`version`]: handshake versions and negotiation
//!
//! ## Wire Format Principles
//! - Little-endian byte order for multi-byte integers
//! - Fixed-size messages for fast parsing
//! - Every message is carried in a `u16` length-prefixed frame
//!
//! ## ⚠️ Important Note for Next Developer
//! - ANY message change requires a new `Version`
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod encryption_level;
pub mod messages;
pub mod version;

pub use codec::{encode_frame, Codec, FrameDecoder, HandshakeMessage, ProtocolCodec};
pub use encryption_level::EncryptionLevel;
pub use messages::{
    ClientFinished, ClientHello, HandshakeReject, MessageType, RejectReason, ServerHello,
};
pub use version::{SupportedVersions, Version, CURRENT_VERSION};

// ============================================
// File: crates/kestrel-core/src/setup/engine.rs
// ============================================
//! # Handshake Engine Interface
//!
//! ## Creation Reason
//! Separates the cryptographic handshake (which messages to send, which
//! secrets result) from the sequencing the crypto setup owns (reading
//! the stream, installing keys, flipping levels).
//!
//! ## Main Functionality
//! - `HandshakeEngine`: pluggable handshake state machine
//! - `HandshakeEvent`: what the engine asks the setup to do
//! - `KeyMaterial`: secret plus context for one level
//!
//! ## ⚠️ Important Note for Next Developer
//! - Engines never touch the connection state directly; they return
//!   events and the crypto setup applies them in order
//! - `HandshakeReject` messages are handled by the setup and never reach
//!   `on_message`
//!
//! ## Last Modified
//! v0.1.0 - Initial engine interface

use kestrel_common::Perspective;

use crate::crypto::{KeyContext, LevelSecret};
use crate::error::Result;
use crate::protocol::{EncryptionLevel, HandshakeMessage, Version};
use crate::setup::nonce::DiversificationNonce;

/// Secret material for one encryption level.
#[derive(Debug)]
pub struct KeyMaterial {
    /// Level the keys protect.
    pub level: EncryptionLevel,
    /// Diffie-Hellman output for the level.
    pub secret: LevelSecret,
    /// Identities bound into the derived keys.
    pub context: KeyContext,
    /// Present for `Secure` only.
    pub diversification_nonce: Option<DiversificationNonce>,
}

/// Action requested by a handshake engine.
#[derive(Debug)]
pub enum HandshakeEvent {
    /// Write a message to the crypto stream.
    Send(HandshakeMessage),
    /// Derive and install keys for a level.
    InstallKeys(KeyMaterial),
    /// The handshake finished successfully.
    Complete,
}

/// A handshake state machine driven by the crypto setup.
pub trait HandshakeEngine: Send {
    /// Which side of the connection this engine plays.
    fn perspective(&self) -> Perspective;

    /// Called once before any message is read.
    ///
    /// # Errors
    /// Any error aborts the handshake.
    fn start(&mut self) -> Result<Vec<HandshakeEvent>>;

    /// Called for every message read from the crypto stream.
    ///
    /// # Errors
    /// Any error aborts the handshake. `HandshakeRefused` carries the
    /// reason reported to the peer.
    fn on_message(&mut self, message: HandshakeMessage) -> Result<Vec<HandshakeEvent>>;

    /// Version both sides agreed on, once known.
    fn negotiated_version(&self) -> Option<Version> {
        None
    }
}

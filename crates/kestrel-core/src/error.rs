// ============================================
// File: crates/kestrel-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Error type for the protocol codec, the key schedule, packet protection
//! and the crypto setup state machine.
//!
//! ## Error Categories
//! 1. **Handshake**: `HandshakeFailure` is fatal to the connection
//! 2. **Packet**: `Decryption` is local and non-fatal, the packet is dropped
//! 3. **Caller bugs**: `LevelNotAvailable`, `InvalidState`
//! 4. **Protocol**: malformed or unexpected handshake messages
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material, IVs or plaintext in error messages
//! - `Decryption` must stay a unit variant: it must not reveal which
//!   encryption levels were tried
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use kestrel_common::error::CommonError;
use kestrel_transport::TransportError;

use crate::protocol::{EncryptionLevel, RejectReason};

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol and cryptographic operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Handshake Errors
    // ========================================

    /// The handshake failed; the connection must be torn down.
    #[error("Handshake failed: {reason}")]
    HandshakeFailure {
        /// Why the handshake failed
        reason: String,
    },

    /// We refused the peer's handshake.
    #[error("Handshake refused: {reason}")]
    HandshakeRefused {
        /// Reason sent to the peer
        reason: RejectReason,
    },

    /// The peer refused our handshake.
    #[error("Peer rejected handshake: {reason}")]
    PeerRejected {
        /// Reason given by the peer
        reason: RejectReason,
    },

    /// The handshake was cancelled before completion.
    #[error("Handshake cancelled")]
    HandshakeCancelled,

    // ========================================
    // Packet Protection Errors
    // ========================================

    /// No installed encryption level authenticated the packet.
    #[error("Decryption failed: authentication error")]
    Decryption,

    /// A seal asked for an encryption level whose keys are not installed.
    #[error("Encryption level {level} is not available")]
    LevelNotAvailable {
        /// The requested level
        level: EncryptionLevel,
    },

    /// Sealing failed inside the AEAD.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being sealed
        context: String,
    },

    // ========================================
    // Crypto Primitive Errors
    // ========================================

    /// Signature verification failed.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// A public key could not be parsed.
    #[error("Invalid key: {context}")]
    InvalidKey {
        /// Which key
        context: String,
    },

    /// Key derivation failed.
    #[error("Key derivation failed: {reason}")]
    KeyDerivation {
        /// Why derivation failed
        reason: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// Unknown handshake message type.
    #[error("Unknown message type: 0x{0:02x}")]
    UnknownMessageType(u8),

    /// Handshake message is malformed.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What's wrong with the message
        reason: String,
    },

    /// Handshake message is too short to be valid.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Handshake message exceeds the frame limit.
    #[error("Message too large: max {max} bytes, got {actual}")]
    MessageTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Actual size
        actual: usize,
    },

    // ========================================
    // State Errors
    // ========================================

    /// Operation not valid in the current state.
    #[error("Invalid state for operation: {operation} requires {required_state}")]
    InvalidState {
        /// What operation was attempted
        operation: String,
        /// What state was required
        required_state: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from the crypto stream.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `HandshakeFailure` error.
    pub fn handshake(reason: impl Into<String>) -> Self {
        Self::HandshakeFailure {
            reason: reason.into(),
        }
    }

    /// Creates a `HandshakeRefused` error.
    #[must_use]
    pub const fn refused(reason: RejectReason) -> Self {
        Self::HandshakeRefused { reason }
    }

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Creates an `InvalidKey` error.
    pub fn invalid_key(context: impl Into<String>) -> Self {
        Self::InvalidKey {
            context: context.into(),
        }
    }

    /// Creates an `InvalidState` error.
    pub fn invalid_state(
        operation: impl Into<String>,
        required_state: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            required_state: required_state.into(),
        }
    }

    /// Wraps any error raised while negotiating into a `HandshakeFailure`.
    ///
    /// Already-fatal handshake errors pass through unchanged.
    #[must_use]
    pub fn into_handshake_failure(self) -> Self {
        match self {
            Self::HandshakeFailure { .. } | Self::HandshakeCancelled => self,
            other => Self::HandshakeFailure {
                reason: other.to_string(),
            },
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if the connection must be closed.
    ///
    /// Per-packet failures (`Decryption`) are never fatal on their own.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailure { .. }
                | Self::HandshakeRefused { .. }
                | Self::PeerRejected { .. }
                | Self::HandshakeCancelled
                | Self::LevelNotAvailable { .. }
                | Self::InvalidState { .. }
                | Self::Transport(_)
        )
    }

    /// Reason to report to the peer when this error aborts a handshake.
    ///
    /// `None` when no reject should be sent: the peer already rejected,
    /// or the crypto stream itself failed.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::HandshakeRefused { reason } => Some(*reason),
            Self::PeerRejected { .. }
            | Self::HandshakeCancelled
            | Self::Transport(_) => None,
            Self::SignatureVerification | Self::InvalidKey { .. } => {
                Some(RejectReason::BadSignature)
            }
            Self::UnknownMessageType(_)
            | Self::MalformedMessage { .. }
            | Self::MessageTooShort { .. }
            | Self::MessageTooLarge { .. } => Some(RejectReason::Malformed),
            _ => Some(RejectReason::Unspecified),
        }
    }

    /// Returns `true` if this error might indicate an attack.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::SignatureVerification | Self::Decryption
        )
    }

    /// Returns `true` if this is a protocol (message format) error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownMessageType(_)
                | Self::MalformedMessage { .. }
                | Self::MessageTooShort { .. }
                | Self::MessageTooLarge { .. }
        )
    }
}

// ============================================
// Tests
// ============================================

// ============================================
// File: crates/kestrel-session/src/error.rs
// ============================================
//! # Session Error Types
//!
//! ## Creation Reason
//! Errors raised above the crypto core: configuration, connection
//! bookkeeping and packet handling.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Lower crate errors are wrapped with `#[from]`, never stringified
//! - `DuplicatePacket` is expected traffic noise, not an attack signal
//!
//! ## Last Modified
//! v0.1.0 - Initial session errors

use std::time::Duration;

use thiserror::Error;

use kestrel_common::error::CommonError;
use kestrel_common::{ConnectionId, PacketNumber};
use kestrel_core::error::CoreError;
use kestrel_core::Version;
use kestrel_transport::error::TransportError;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session error types.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("Connection {0} already registered")]
    ConnectionExists(ConnectionId),

    #[error("Connection limit reached: max {limit} connections")]
    ConnectionLimitReached {
        limit: usize,
    },

    #[error("Version {0} is not supported by this endpoint")]
    UnsupportedVersion(Version),

    #[error("Handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Duplicate packet {0}")]
    DuplicatePacket(PacketNumber),

    #[error("Packet {0} is older than the receive window")]
    PacketTooOld(PacketNumber),

    #[error("Invalid packet header: {reason}")]
    InvalidHeader {
        reason: String,
    },

    #[error("Packet number space exhausted")]
    PacketNumberExhausted,

    #[error("Connection is closed")]
    Closed,

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_header(reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Errors after which the connection cannot be used.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::HandshakeTimeout(_) | Self::Closed | Self::PacketNumberExhausted => true,
            Self::Core(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Per-packet errors; drop the packet and carry on.
    #[must_use]
    pub fn is_packet_error(&self) -> bool {
        match self {
            Self::DuplicatePacket(_) | Self::PacketTooOld(_) | Self::InvalidHeader { .. } => true,
            Self::Core(CoreError::Decryption) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::config_invalid("limits.max_connections", "must be greater than 0");
        assert!(err.to_string().contains("limits.max_connections"));
        assert!(err.is_config_error());

        let err = SessionError::DuplicatePacket(PacketNumber::new(7));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_classification() {
        assert!(SessionError::Closed.is_fatal());
        assert!(SessionError::HandshakeTimeout(Duration::from_secs(1)).is_fatal());
        assert!(!SessionError::DuplicatePacket(PacketNumber::new(1)).is_fatal());

        assert!(SessionError::from(CoreError::Decryption).is_packet_error());
        assert!(SessionError::invalid_header("short").is_packet_error());
        assert!(!SessionError::Closed.is_packet_error());
    }
}

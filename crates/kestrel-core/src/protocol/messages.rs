// ============================================
// File: crates/kestrel-core/src/protocol/messages.rs
// ============================================
//! # Handshake Messages
//!
//! ## Creation Reason
//! Defines the messages exchanged on the crypto stream by the default
//! handshake engine.
//!
//! ## Message Flow
//! ```text
//! Client                                   Server
//!   │  ClientHello (173 bytes)  ───────────►  │
//!   │                                         │  install Secure
//!   │  ◄───────────  ServerHello (197 bytes)  │
//!   │  install Secure, ForwardSecure          │
//!   │  ClientFinished (65 bytes) ──────────►  │
//!   │                                         │  install ForwardSecure
//! ```
//! Either side may send `HandshakeReject` (2 bytes) before giving up.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Sizes are fixed; the codec relies on them
//! - `signed_bytes` defines exactly what a signature covers. Changing it
//!   is a wire format change.
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================
// Message Size Constants
// ============================================

/// Size of a ClientHello in bytes.
pub const CLIENT_HELLO_SIZE: usize = 173;

/// Size of a ServerHello in bytes.
pub const SERVER_HELLO_SIZE: usize = 197;

/// Size of a ClientFinished in bytes.
pub const CLIENT_FINISHED_SIZE: usize = 65;

/// Size of a HandshakeReject in bytes.
pub const HANDSHAKE_REJECT_SIZE: usize = 2;

/// Signature length.
pub const SIGNATURE_SIZE: usize = 64;

// ============================================
// MessageType
// ============================================

/// Handshake message type identifier.
///
/// | Value | Type |
/// |-------|------|
/// | 0x01 | ClientHello |
/// | 0x02 | ServerHello |
/// | 0x03 | ClientFinished |
/// | 0x04 | HandshakeReject |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Client's opening message.
    ClientHello = 0x01,
    /// Server's response carrying the diversification nonce.
    ServerHello = 0x02,
    /// Client's confirmation of the transcript.
    ClientFinished = 0x03,
    /// Terminal refusal from either side.
    HandshakeReject = 0x04,
}

impl MessageType {
    /// Converts a byte to a `MessageType`.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ClientHello),
            0x02 => Some(Self::ServerHello),
            0x03 => Some(Self::ClientFinished),
            0x04 => Some(Self::HandshakeReject),
            _ => None,
        }
    }

    /// Converts the `MessageType` to its byte representation.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Fixed wire size of messages of this type.
    #[must_use]
    pub const fn wire_size(&self) -> usize {
        match self {
            Self::ClientHello => CLIENT_HELLO_SIZE,
            Self::ServerHello => SERVER_HELLO_SIZE,
            Self::ClientFinished => CLIENT_FINISHED_SIZE,
            Self::HandshakeReject => HANDSHAKE_REJECT_SIZE,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_byte(value).ok_or(value)
    }
}

// ============================================
// ClientHello
// ============================================

/// Client's opening handshake message.
///
/// # Wire Format (173 bytes)
/// ```text
/// ┌────────────────────────────────────────────┐
/// │ message_type (1 byte)          │ 0x01      │
/// │ version (4 bytes LE)           │           │
/// │ client_public_key (32 bytes)   │ Ed25519   │
/// │ client_initial_key (32 bytes)  │ X25519    │
/// │ client_forward_key (32 bytes)  │ X25519    │
/// │ timestamp (8 bytes LE)         │ Unix secs │
/// │ signature (64 bytes)           │ Ed25519   │
/// └────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Requested handshake version.
    pub version: u32,
    /// Client identity.
    pub client_public_key: [u8; 32],
    /// Exchanged with the server's static config key for `Secure`.
    pub client_initial_key: [u8; 32],
    /// Exchanged with the server's ephemeral key for `ForwardSecure`.
    pub client_forward_key: [u8; 32],
    /// Unix seconds at the client.
    pub timestamp: u64,
    /// Signature over every field above.
    pub signature: [u8; SIGNATURE_SIZE],
}

impl ClientHello {
    /// Bytes covered by the signature.
    #[must_use]
    pub fn signed_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(CLIENT_HELLO_SIZE - SIGNATURE_SIZE);
        data.push(MessageType::ClientHello.as_byte());
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&self.client_public_key);
        data.extend_from_slice(&self.client_initial_key);
        data.extend_from_slice(&self.client_forward_key);
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data
    }
}

// ============================================
// ServerHello
// ============================================

/// Server's handshake response.
///
/// # Wire Format (197 bytes)
/// ```text
/// ┌───────────────────────────────────────────────┐
/// │ message_type (1 byte)             │ 0x02      │
/// │ version (4 bytes LE)              │           │
/// │ server_public_key (32 bytes)      │ Ed25519   │
/// │ server_config_key (32 bytes)      │ X25519    │
/// │ server_forward_key (32 bytes)     │ X25519    │
/// │ diversification_nonce (32 bytes)  │           │
/// │ signature (64 bytes)              │ Ed25519   │
/// └───────────────────────────────────────────────┘
/// ```
///
/// # Signature Covers
/// All fields above, followed by the SHA-256 of the encoded ClientHello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Selected handshake version.
    pub version: u32,
    /// Server identity.
    pub server_public_key: [u8; 32],
    /// Server's static X25519 configuration key.
    pub server_config_key: [u8; 32],
    /// Server's ephemeral X25519 key.
    pub server_forward_key: [u8; 32],
    /// Connection-specific nonce mixed into the `Secure` keys.
    pub diversification_nonce: [u8; 32],
    /// Signature over the fields and the client transcript hash.
    pub signature: [u8; SIGNATURE_SIZE],
}

impl ServerHello {
    /// Bytes covered by the signature.
    #[must_use]
    pub fn signed_bytes(&self, client_hello_hash: &[u8; 32]) -> Vec<u8> {
        let mut data = Vec::with_capacity(SERVER_HELLO_SIZE - SIGNATURE_SIZE + 32);
        data.push(MessageType::ServerHello.as_byte());
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(&self.server_public_key);
        data.extend_from_slice(&self.server_config_key);
        data.extend_from_slice(&self.server_forward_key);
        data.extend_from_slice(&self.diversification_nonce);
        data.extend_from_slice(client_hello_hash);
        data
    }
}

// ============================================
// ClientFinished
// ============================================

/// Client's signature over the full transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFinished {
    /// Signature over `FINISHED_LABEL || SHA-256(ClientHello || ServerHello)`.
    pub signature: [u8; SIGNATURE_SIZE],
}

/// Domain separation label for the ClientFinished signature.
pub const FINISHED_LABEL: &[u8] = b"kestrel client finished";

// ============================================
// HandshakeReject
// ============================================

/// Why a handshake was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RejectReason {
    /// No reason given.
    Unspecified = 0,
    /// Requested version not in the peer's list.
    UnsupportedVersion = 1,
    /// A signature did not verify.
    BadSignature = 2,
    /// The hello timestamp was outside the allowed skew.
    StaleTimestamp = 3,
    /// A message could not be parsed.
    Malformed = 4,
    /// A message arrived out of order.
    UnexpectedMessage = 5,
    /// The peer's identity key is not the one we expect.
    UntrustedIdentity = 6,
}

impl RejectReason {
    /// Decodes a reason byte. Unknown values read as `Unspecified`.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::UnsupportedVersion,
            2 => Self::BadSignature,
            3 => Self::StaleTimestamp,
            4 => Self::Malformed,
            5 => Self::UnexpectedMessage,
            6 => Self::UntrustedIdentity,
            _ => Self::Unspecified,
        }
    }

    /// Returns the byte representation.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unspecified => "unspecified",
            Self::UnsupportedVersion => "unsupported version",
            Self::BadSignature => "bad signature",
            Self::StaleTimestamp => "stale timestamp",
            Self::Malformed => "malformed message",
            Self::UnexpectedMessage => "unexpected message",
            Self::UntrustedIdentity => "untrusted identity",
        };
        f.write_str(s)
    }
}

/// Terminal refusal sent by either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeReject {
    /// Why the handshake was refused.
    pub reason: RejectReason,
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::from_byte(0x01), Some(MessageType::ClientHello));
        assert_eq!(MessageType::from_byte(0x04), Some(MessageType::HandshakeReject));
        assert_eq!(MessageType::from_byte(0xFF), None);
        assert_eq!(MessageType::try_from(0x03), Ok(MessageType::ClientFinished));
    }

    #[test]
    fn test_signed_bytes_exclude_signature() {
        let hello = ClientHello {
            version: 1,
            client_public_key: [1; 32],
            client_initial_key: [2; 32],
            client_forward_key: [3; 32],
            timestamp: 7,
            signature: [9; 64],
        };
        let data = hello.signed_bytes();
        assert_eq!(data.len(), CLIENT_HELLO_SIZE - SIGNATURE_SIZE);
        assert!(!data.ends_with(&[9; 64]));
    }

    #[test]
    fn test_server_signed_bytes_bind_client_hash() {
        let hello = ServerHello {
            version: 1,
            server_public_key: [1; 32],
            server_config_key: [2; 32],
            server_forward_key: [3; 32],
            diversification_nonce: [4; 32],
            signature: [0; 64],
        };
        assert_ne!(hello.signed_bytes(&[0; 32]), hello.signed_bytes(&[1; 32]));
    }

    #[test]
    fn test_reject_reason_unknown_byte() {
        assert_eq!(RejectReason::from_byte(200), RejectReason::Unspecified);
        assert_eq!(RejectReason::from_byte(2), RejectReason::BadSignature);
        assert_eq!(RejectReason::StaleTimestamp.to_string(), "stale timestamp");
    }
}

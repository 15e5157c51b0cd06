// ============================================
// File: crates/kestrel-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Identifiers that travel between the crypto core and the session layer.
//!
//! ## Main Functionality
//! - `ConnectionId`: 64-bit connection identifier, the arena key for
//!   per-connection state
//! - `PacketNumber`: monotonically assigned packet number; input to the
//!   per-packet AEAD nonce
//! - `Perspective`: which side of the connection we are
//!
//! ## ⚠️ Important Note for Next Developer
//! - `ConnectionId` is not secret (it is sent in every packet header), so it
//!   is `Copy` and printable
//! - `PacketNumber::next` refuses to wrap: a wrapped packet number would
//!   repeat an AEAD nonce
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Constants
// ============================================

/// Size of a connection id in bytes.
pub const CONNECTION_ID_SIZE: usize = 8;

// ============================================
// ConnectionId
// ============================================

/// Identifier of a single connection.
///
/// # Wire Format
/// ```text
/// ┌────────────────────────────────────┐
/// │     Connection ID (8 bytes)        │
/// │  Present in every public header    │
/// └────────────────────────────────────┘
/// ```
///
/// # Example
/// ```
/// use kestrel_common::types::ConnectionId;
///
/// let id = ConnectionId::generate();
/// let parsed: ConnectionId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId([u8; CONNECTION_ID_SIZE]);

impl ConnectionId {
    /// Creates a connection id from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; CONNECTION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a connection id from a slice, `None` if the length is wrong.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; CONNECTION_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Generates a random connection id.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = [0u8; CONNECTION_ID_SIZE];
        rand::thread_rng().fill_bytes(&mut id);
        Self(id)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CONNECTION_ID_SIZE] {
        &self.0
    }

    /// Returns the id as a big-endian integer.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", hex::encode(self.0))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ConnectionId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| CommonError::decoding("connection id", e.to_string()))?;
        Self::from_slice(&bytes)
            .ok_or(CommonError::invalid_length(CONNECTION_ID_SIZE, bytes.len()))
    }
}

impl Serialize for ConnectionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// PacketNumber
// ============================================

/// Packet number, unique per connection and direction.
///
/// The crypto core derives the AEAD nonce from it; the session layer is
/// responsible for never handing the same value out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketNumber(u64);

impl PacketNumber {
    /// The first packet number of a connection.
    pub const ZERO: Self = Self(0);

    /// Creates a packet number from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the following packet number, `None` on exhaustion.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Big-endian encoding, as mixed into the AEAD nonce.
    #[must_use]
    pub const fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for PacketNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<PacketNumber> for u64 {
    fn from(pn: PacketNumber) -> Self {
        pn.0
    }
}

impl fmt::Display for PacketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// Perspective
// ============================================

/// Which endpoint of the connection this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    /// Initiated the connection.
    Client,
    /// Accepted the connection.
    Server,
}

impl Perspective {
    /// Returns the other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }

    /// Direction label mixed into key derivation and integrity tags.
    #[must_use]
    pub const fn label(self) -> &'static [u8] {
        match self {
            Self::Client => b"Client",
            Self::Server => b"Server",
        }
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_connection_id_string_roundtrip() {
        let id = ConnectionId::from(0x0102_0304_0506_0708);
        assert_eq!(id.to_string(), "0102030405060708");
        let parsed: ConnectionId = "0102030405060708".parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.as_u64(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_connection_id_rejects_bad_input() {
        assert!("0102".parse::<ConnectionId>().is_err());
        assert!("zz02030405060708".parse::<ConnectionId>().is_err());
        assert!(ConnectionId::from_slice(&[0u8; 9]).is_none());
    }

    #[test]
    fn test_connection_id_json() {
        let id = ConnectionId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let restored: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn test_packet_number_next() {
        assert_eq!(PacketNumber::ZERO.next(), Some(PacketNumber::new(1)));
        assert_eq!(PacketNumber::new(u64::MAX).next(), None);
        assert_eq!(PacketNumber::new(42).to_be_bytes()[7], 42);
    }

    #[test]
    fn test_perspective() {
        assert_eq!(Perspective::Client.opposite(), Perspective::Server);
        assert_ne!(Perspective::Client.label(), Perspective::Server.label());
        assert_eq!(Perspective::Server.to_string(), "server");
    }
}

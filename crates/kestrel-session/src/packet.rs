// ============================================
// File: crates/kestrel-session/src/packet.rs
// ============================================
//! # Public Packet Header
//!
//! ## Wire Format
//! ```text
//! ┌───────┬───────────────┬───────────────┬──────────────────────────┐
//! │ flags │ connection id │ packet number │ diversification nonce    │
//! │  1 B  │      8 B      │   8 B (BE)    │ 32 B, only if flag 0x01  │
//! └───────┴───────────────┴───────────────┴──────────────────────────┘
//! followed by the protected payload
//! ```
//! The encoded header is the associated data of the payload, so every
//! header bit is authenticated.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only server packets sealed at `Secure` carry the nonce
//! - Unknown flag bits are rejected, not ignored
//!
//! ## Last Modified
//! v0.1.0 - Initial header codec

use kestrel_common::types::CONNECTION_ID_SIZE;
use kestrel_common::{ConnectionId, PacketNumber};
use kestrel_core::setup::{DiversificationNonce, DIVERSIFICATION_NONCE_SIZE};
use kestrel_core::EncryptionLevel;

use crate::error::{Result, SessionError};

/// Header flag: a diversification nonce follows the packet number.
pub const FLAG_DIVERSIFICATION_NONCE: u8 = 0x01;

const KNOWN_FLAGS: u8 = FLAG_DIVERSIFICATION_NONCE;

/// Header size without the optional nonce.
pub const MIN_HEADER_SIZE: usize = 1 + CONNECTION_ID_SIZE + 8;

/// Header size with the nonce.
pub const MAX_HEADER_SIZE: usize = MIN_HEADER_SIZE + DIVERSIFICATION_NONCE_SIZE;

/// Unprotected part of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Connection the packet belongs to.
    pub connection_id: ConnectionId,
    /// Sender-assigned number, also the AEAD nonce input.
    pub packet_number: PacketNumber,
    /// Present on server packets sealed at `Secure`.
    pub diversification_nonce: Option<DiversificationNonce>,
}

impl PacketHeader {
    /// Encoded length.
    #[must_use]
    pub const fn len(&self) -> usize {
        if self.diversification_nonce.is_some() {
            MAX_HEADER_SIZE
        } else {
            MIN_HEADER_SIZE
        }
    }

    /// Never true; a header always has its fixed fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Appends the encoded header to `dst`.
    pub fn encode_into(&self, dst: &mut Vec<u8>) {
        let flags = if self.diversification_nonce.is_some() {
            FLAG_DIVERSIFICATION_NONCE
        } else {
            0
        };
        dst.reserve(self.len());
        dst.push(flags);
        dst.extend_from_slice(self.connection_id.as_bytes());
        dst.extend_from_slice(&self.packet_number.to_be_bytes());
        if let Some(nonce) = &self.diversification_nonce {
            dst.extend_from_slice(nonce.as_bytes());
        }
    }

    /// Encodes into a fresh buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        self.encode_into(&mut buf);
        buf
    }

    /// Parses the header at the start of `packet`.
    ///
    /// # Returns
    /// The header and its encoded length.
    ///
    /// # Errors
    /// `InvalidHeader` if the packet is truncated or uses unknown flags.
    pub fn decode(packet: &[u8]) -> Result<(Self, usize)> {
        let Some((&flags, rest)) = packet.split_first() else {
            return Err(SessionError::invalid_header("empty packet"));
        };
        if flags & !KNOWN_FLAGS != 0 {
            return Err(SessionError::invalid_header(format!(
                "unknown flags 0x{flags:02x}"
            )));
        }

        let has_nonce = flags & FLAG_DIVERSIFICATION_NONCE != 0;
        let len = if has_nonce { MAX_HEADER_SIZE } else { MIN_HEADER_SIZE };
        if packet.len() < len {
            return Err(SessionError::invalid_header(format!(
                "{} bytes, header needs {len}",
                packet.len()
            )));
        }

        let (cid, rest) = rest.split_at(CONNECTION_ID_SIZE);
        let (pn, rest) = rest.split_at(8);
        let connection_id = ConnectionId::from_slice(cid)
            .ok_or_else(|| SessionError::invalid_header("connection id"))?;
        let mut pn_bytes = [0u8; 8];
        pn_bytes.copy_from_slice(pn);

        let diversification_nonce = has_nonce.then(|| {
            let mut nonce = [0u8; DIVERSIFICATION_NONCE_SIZE];
            nonce.copy_from_slice(&rest[..DIVERSIFICATION_NONCE_SIZE]);
            DiversificationNonce::from_bytes(nonce)
        });

        Ok((
            Self {
                connection_id,
                packet_number: PacketNumber::new(u64::from_be_bytes(pn_bytes)),
                diversification_nonce,
            },
            len,
        ))
    }
}

/// A sealed packet ready for the wire.
#[derive(Debug, Clone)]
pub struct OutgoingPacket {
    /// Number assigned to the packet.
    pub packet_number: PacketNumber,
    /// Level the payload was sealed at.
    pub level: EncryptionLevel,
    /// Header followed by the protected payload.
    pub bytes: Vec<u8>,
}

/// An authenticated, opened packet.
#[derive(Debug, Clone)]
pub struct IncomingPacket {
    /// Number the peer assigned.
    pub packet_number: PacketNumber,
    /// Level whose keys authenticated the packet.
    pub level: EncryptionLevel,
    /// Decrypted payload.
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(nonce: Option<DiversificationNonce>) -> PacketHeader {
        PacketHeader {
            connection_id: ConnectionId::from(0x0102_0304_0506_0708_u64),
            packet_number: PacketNumber::new(42),
            diversification_nonce: nonce,
        }
    }

    #[test]
    fn test_layout_without_nonce() {
        let bytes = header(None).encode();
        assert_eq!(bytes.len(), MIN_HEADER_SIZE);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[9..17], &42u64.to_be_bytes());

        let (decoded, len) = PacketHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header(None));
        assert_eq!(len, MIN_HEADER_SIZE);
    }

    #[test]
    fn test_nonce_is_carried() {
        let nonce = DiversificationNonce::from_bytes([7u8; DIVERSIFICATION_NONCE_SIZE]);
        let mut bytes = header(Some(nonce)).encode();
        assert_eq!(bytes[0], FLAG_DIVERSIFICATION_NONCE);
        bytes.extend_from_slice(b"payload");

        let (decoded, len) = PacketHeader::decode(&bytes).unwrap();
        assert_eq!(decoded.diversification_nonce, Some(nonce));
        assert_eq!(&bytes[len..], b"payload");
    }

    #[test]
    fn test_rejects_truncated_and_unknown_flags() {
        assert!(PacketHeader::decode(&[]).is_err());

        let bytes = header(None).encode();
        assert!(PacketHeader::decode(&bytes[..MIN_HEADER_SIZE - 1]).is_err());

        let mut flagged = bytes.clone();
        flagged[0] = FLAG_DIVERSIFICATION_NONCE;
        assert!(PacketHeader::decode(&flagged).is_err());

        let mut unknown = bytes;
        unknown[0] = 0x80;
        assert!(matches!(
            PacketHeader::decode(&unknown),
            Err(SessionError::InvalidHeader { .. })
        ));
    }
}

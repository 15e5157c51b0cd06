// ============================================
// File: crates/kestrel-core/src/crypto/protection.rs
// ============================================
//! # Packet Protection
//!
//! ## Creation Reason
//! Authenticated encryption of packet payloads, one instance per
//! direction per encryption level.
//!
//! ## Main Functionality
//! - `PacketProtection`: seal/open interface used by the crypto setup
//! - `AeadProtection`: ChaCha20-Poly1305 for `Secure` and `ForwardSecure`
//! - `NullProtection`: integrity-only hash for `Unencrypted`
//!
//! ## Nonce Format
//! ```text
//! nonce (12 bytes) = iv XOR (0x00000000 || packet_number as u64 BE)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A (key, packet number) pair MUST never seal two different
//!   plaintexts; callers allocate packet numbers uniquely per direction
//! - On failure `dst` is restored to its original length; nothing from a
//!   failed open is ever observable
//!
//! ## Last Modified
//! v0.1.0 - Initial packet protection implementation

use std::fmt;

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use kestrel_common::{PacketNumber, Perspective};

use super::keys::PacketKey;
use super::{AEAD_IV_SIZE, NULL_TAG_SIZE, POLY1305_TAG_SIZE};
use crate::error::{CoreError, Result};

// ============================================
// PacketProtection Trait
// ============================================

/// One direction of one encryption level's packet protection.
pub trait PacketProtection: Send + Sync {
    /// Appends the protected form of `plaintext` to `dst`.
    ///
    /// # Errors
    /// Returns `Encryption` if the AEAD refuses the input.
    fn seal_into(
        &self,
        dst: &mut Vec<u8>,
        plaintext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<()>;

    /// Appends the authenticated plaintext of `ciphertext` to `dst`.
    ///
    /// # Errors
    /// Returns `Decryption` on any authentication failure.
    fn open_into(
        &self,
        dst: &mut Vec<u8>,
        ciphertext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<()>;

    /// Bytes added by sealing.
    fn overhead(&self) -> usize;
}

/// Builds the per-packet nonce from the level IV and the packet number.
#[must_use]
pub fn make_nonce(iv: &[u8; AEAD_IV_SIZE], packet_number: PacketNumber) -> [u8; AEAD_IV_SIZE] {
    let mut nonce = *iv;
    let pn = packet_number.to_be_bytes();
    for (n, p) in nonce[AEAD_IV_SIZE - pn.len()..].iter_mut().zip(pn) {
        *n ^= p;
    }
    nonce
}

// ============================================
// AeadProtection
// ============================================

/// ChaCha20-Poly1305 protection.
pub struct AeadProtection {
    cipher: ChaCha20Poly1305,
    iv: [u8; AEAD_IV_SIZE],
}

impl AeadProtection {
    /// Creates protection from one direction's packet key.
    #[must_use]
    pub fn new(key: &PacketKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.key())),
            iv: *key.iv(),
        }
    }
}

impl PacketProtection for AeadProtection {
    fn seal_into(
        &self,
        dst: &mut Vec<u8>,
        plaintext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<()> {
        let nonce = make_nonce(&self.iv, packet_number);
        let start = dst.len();
        dst.reserve(plaintext.len() + POLY1305_TAG_SIZE);
        dst.extend_from_slice(plaintext);

        match self.cipher.encrypt_in_place_detached(
            Nonce::from_slice(&nonce),
            associated_data,
            &mut dst[start..],
        ) {
            Ok(tag) => {
                dst.extend_from_slice(&tag);
                Ok(())
            }
            Err(_) => {
                dst.truncate(start);
                Err(CoreError::Encryption {
                    context: "ChaCha20-Poly1305 encryption failed".into(),
                })
            }
        }
    }

    fn open_into(
        &self,
        dst: &mut Vec<u8>,
        ciphertext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<()> {
        let Some(body_len) = ciphertext.len().checked_sub(POLY1305_TAG_SIZE) else {
            return Err(CoreError::Decryption);
        };
        let (body, tag) = ciphertext.split_at(body_len);
        let nonce = make_nonce(&self.iv, packet_number);

        let start = dst.len();
        dst.extend_from_slice(body);
        let opened = self.cipher.decrypt_in_place_detached(
            Nonce::from_slice(&nonce),
            associated_data,
            &mut dst[start..],
            Tag::from_slice(tag),
        );
        if opened.is_err() {
            dst.truncate(start);
            return Err(CoreError::Decryption);
        }
        Ok(())
    }

    fn overhead(&self) -> usize {
        POLY1305_TAG_SIZE
    }
}

impl fmt::Debug for AeadProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AeadProtection([REDACTED])")
    }
}

// ============================================
// NullProtection
// ============================================

/// Integrity-only protection used before any key exchange.
///
/// The payload travels in the clear followed by a truncated SHA-256 over
/// the sender's label, the packet number, the associated data and the
/// payload. It detects corruption, not forgery.
#[derive(Debug, Clone, Copy)]
pub struct NullProtection {
    sender: Perspective,
}

impl NullProtection {
    /// Protection for packets sent by `sender`.
    #[must_use]
    pub const fn new(sender: Perspective) -> Self {
        Self { sender }
    }

    fn tag(
        &self,
        payload: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> [u8; NULL_TAG_SIZE] {
        let mut hasher = Sha256::new();
        hasher.update(self.sender.label());
        hasher.update(packet_number.to_be_bytes());
        hasher.update((associated_data.len() as u64).to_be_bytes());
        hasher.update(associated_data);
        hasher.update(payload);
        let digest = hasher.finalize();

        let mut tag = [0u8; NULL_TAG_SIZE];
        tag.copy_from_slice(&digest[..NULL_TAG_SIZE]);
        tag
    }
}

impl PacketProtection for NullProtection {
    fn seal_into(
        &self,
        dst: &mut Vec<u8>,
        plaintext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<()> {
        let tag = self.tag(plaintext, packet_number, associated_data);
        dst.reserve(plaintext.len() + NULL_TAG_SIZE);
        dst.extend_from_slice(plaintext);
        dst.extend_from_slice(&tag);
        Ok(())
    }

    fn open_into(
        &self,
        dst: &mut Vec<u8>,
        ciphertext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<()> {
        let Some(body_len) = ciphertext.len().checked_sub(NULL_TAG_SIZE) else {
            return Err(CoreError::Decryption);
        };
        let (body, received) = ciphertext.split_at(body_len);
        let expected = self.tag(body, packet_number, associated_data);
        if !bool::from(expected.ct_eq(received)) {
            return Err(CoreError::Decryption);
        }
        dst.extend_from_slice(body);
        Ok(())
    }

    fn overhead(&self) -> usize {
        NULL_TAG_SIZE
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn aead() -> AeadProtection {
        AeadProtection::new(&PacketKey::new([0x42; 32], [0x24; 12]))
    }

    #[test]
    fn test_make_nonce_xors_packet_number() {
        let iv = [0u8; 12];
        let nonce = make_nonce(&iv, PacketNumber::new(0x0102));
        assert_eq!(nonce, [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);

        let iv = [0xFF; 12];
        assert_ne!(
            make_nonce(&iv, PacketNumber::new(1)),
            make_nonce(&iv, PacketNumber::new(2))
        );
    }

    #[test]
    fn test_aead_roundtrip_appends() {
        let p = aead();
        let mut sealed = b"header".to_vec();
        p.seal_into(&mut sealed, b"payload", PacketNumber::new(7), b"ad")
            .unwrap();
        assert_eq!(sealed.len(), 6 + 7 + POLY1305_TAG_SIZE);

        let mut opened = Vec::new();
        p.open_into(&mut opened, &sealed[6..], PacketNumber::new(7), b"ad")
            .unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn test_aead_rejects_wrong_context() {
        let p = aead();
        let mut sealed = Vec::new();
        p.seal_into(&mut sealed, b"payload", PacketNumber::new(7), b"ad")
            .unwrap();

        let mut dst = b"keep".to_vec();
        assert!(matches!(
            p.open_into(&mut dst, &sealed, PacketNumber::new(8), b"ad"),
            Err(CoreError::Decryption)
        ));
        assert!(p
            .open_into(&mut dst, &sealed, PacketNumber::new(7), b"xx")
            .is_err());
        assert!(p.open_into(&mut dst, &sealed[..10], PacketNumber::new(7), b"ad").is_err());
        assert_eq!(dst, b"keep");
    }

    #[test]
    fn test_same_packet_number_different_plaintext() {
        let p = aead();
        let mut a = Vec::new();
        let mut b = Vec::new();
        p.seal_into(&mut a, b"first", PacketNumber::new(1), b"").unwrap();
        p.seal_into(&mut b, b"other", PacketNumber::new(1), b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_null_protection_direction_bound() {
        let client = NullProtection::new(Perspective::Client);
        let server = NullProtection::new(Perspective::Server);

        let mut sealed = Vec::new();
        client
            .seal_into(&mut sealed, b"hello", PacketNumber::new(1), b"hdr")
            .unwrap();
        assert!(sealed.starts_with(b"hello"));

        let mut out = Vec::new();
        client
            .open_into(&mut out, &sealed, PacketNumber::new(1), b"hdr")
            .unwrap();
        assert_eq!(out, b"hello");

        out.clear();
        assert!(server
            .open_into(&mut out, &sealed, PacketNumber::new(1), b"hdr")
            .is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_null_protection_detects_corruption() {
        let p = NullProtection::new(Perspective::Server);
        let mut sealed = Vec::new();
        p.seal_into(&mut sealed, b"hello", PacketNumber::new(3), b"")
            .unwrap();
        sealed[0] ^= 0x01;
        let mut out = Vec::new();
        assert!(matches!(
            p.open_into(&mut out, &sealed, PacketNumber::new(3), b""),
            Err(CoreError::Decryption)
        ));
        assert!(p.open_into(&mut out, &[1, 2], PacketNumber::new(3), b"").is_err());
    }
}

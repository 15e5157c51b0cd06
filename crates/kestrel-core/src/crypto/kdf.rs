// ============================================
// File: crates/kestrel-core/src/crypto/kdf.rs
// ============================================
//! # Key Derivation Functions
//!
//! ## Creation Reason
//! Expands one level's shared secret into the per-direction AEAD keys and
//! IVs for that level.
//!
//! ## Derivation
//! ```text
//! prk  = HKDF-Extract(salt = level salt, ikm = level secret)
//! okm  = HKDF-Expand(prk, info, 88)
//! info = "kestrel key expansion" || client_public || server_public
//!        [|| diversification_nonce]          (Secure level only)
//!
//! okm[ 0..32] client write key    okm[32..44] client write IV
//! okm[44..76] server write key    okm[76..88] server write IV
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both identity keys are bound into `info`; a man in the middle
//!   derives different keys
//! - Never log the secret, the okm or the derived keys
//!
//! ## Last Modified
//! v0.1.0 - Initial KDF implementation

use hkdf::Hkdf;
use sha2::Sha256;
use tracing::trace;
use zeroize::Zeroize;

use kestrel_common::Perspective;

use super::keys::{LevelSecret, PacketKey};
use super::{AEAD_IV_SIZE, AEAD_KEY_SIZE, ED25519_PUBLIC_KEY_SIZE, HKDF_INFO_PREFIX};
use crate::error::{CoreError, Result};
use crate::protocol::EncryptionLevel;

const DIRECTION_SIZE: usize = AEAD_KEY_SIZE + AEAD_IV_SIZE;

// ============================================
// KeyContext
// ============================================

/// Identities both sides bind into every derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyContext {
    /// Client's Ed25519 public key.
    pub client_public: [u8; ED25519_PUBLIC_KEY_SIZE],
    /// Server's Ed25519 public key.
    pub server_public: [u8; ED25519_PUBLIC_KEY_SIZE],
}

// ============================================
// LevelKeys
// ============================================

/// Both directions' keys for one encryption level.
#[derive(Debug)]
pub struct LevelKeys {
    /// Keys the client seals with and the server opens with.
    pub client_write: PacketKey,
    /// Keys the server seals with and the client opens with.
    pub server_write: PacketKey,
}

impl LevelKeys {
    /// Splits into `(seal, open)` keys for the given side.
    #[must_use]
    pub fn for_perspective(self, perspective: Perspective) -> (PacketKey, PacketKey) {
        match perspective {
            Perspective::Client => (self.client_write, self.server_write),
            Perspective::Server => (self.server_write, self.client_write),
        }
    }
}

/// HKDF salt for a level.
///
/// # Errors
/// Returns `KeyDerivation` for levels without a key schedule.
fn level_salt(level: EncryptionLevel) -> Result<&'static [u8]> {
    match level {
        EncryptionLevel::Secure => Ok(b"kestrel-v1 secure"),
        EncryptionLevel::ForwardSecure => Ok(b"kestrel-v1 forward secure"),
        other => Err(CoreError::KeyDerivation {
            reason: format!("no key schedule for {other} level"),
        }),
    }
}

/// Derives the packet keys for `level`.
///
/// # Arguments
/// * `level` - `Secure` or `ForwardSecure`
/// * `secret` - Diffie-Hellman output for the level
/// * `context` - Identities of both endpoints
/// * `diversification_nonce` - Mixed in for `Secure` only
///
/// # Errors
/// Returns `KeyDerivation` for `Unspecified`/`Unencrypted`.
pub fn derive_level_keys(
    level: EncryptionLevel,
    secret: &LevelSecret,
    context: &KeyContext,
    diversification_nonce: Option<&[u8; 32]>,
) -> Result<LevelKeys> {
    let salt = level_salt(level)?;

    let mut info = Vec::with_capacity(HKDF_INFO_PREFIX.len() + ED25519_PUBLIC_KEY_SIZE * 2 + 32);
    info.extend_from_slice(HKDF_INFO_PREFIX);
    info.extend_from_slice(&context.client_public);
    info.extend_from_slice(&context.server_public);
    if level == EncryptionLevel::Secure {
        if let Some(nonce) = diversification_nonce {
            info.extend_from_slice(nonce);
        }
    }

    let hk = Hkdf::<Sha256>::new(Some(salt), secret.as_bytes());
    let mut okm = [0u8; DIRECTION_SIZE * 2];
    hk.expand(&info, &mut okm)
        .map_err(|_| CoreError::KeyDerivation {
            reason: "HKDF expansion failed".into(),
        })?;

    let client_write = split_direction(&okm[..DIRECTION_SIZE]);
    let server_write = split_direction(&okm[DIRECTION_SIZE..]);
    okm.zeroize();

    trace!(%level, info_len = info.len(), "Derived level keys");
    Ok(LevelKeys {
        client_write,
        server_write,
    })
}

fn split_direction(okm: &[u8]) -> PacketKey {
    let mut key = [0u8; AEAD_KEY_SIZE];
    let mut iv = [0u8; AEAD_IV_SIZE];
    key.copy_from_slice(&okm[..AEAD_KEY_SIZE]);
    iv.copy_from_slice(&okm[AEAD_KEY_SIZE..DIRECTION_SIZE]);
    let packet_key = PacketKey::new(key, iv);
    key.zeroize();
    iv.zeroize();
    packet_key
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> KeyContext {
        KeyContext {
            client_public: [0x01; 32],
            server_public: [0x02; 32],
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let secret = LevelSecret::from_bytes([0x42; 32]);
        let a = derive_level_keys(EncryptionLevel::ForwardSecure, &secret, &context(), None)
            .unwrap();
        let b = derive_level_keys(EncryptionLevel::ForwardSecure, &secret, &context(), None)
            .unwrap();
        assert_eq!(a.client_write, b.client_write);
        assert_eq!(a.server_write, b.server_write);
    }

    #[test]
    fn test_directions_differ() {
        let secret = LevelSecret::from_bytes([0x42; 32]);
        let keys = derive_level_keys(EncryptionLevel::Secure, &secret, &context(), Some(&[7; 32]))
            .unwrap();
        assert_ne!(keys.client_write, keys.server_write);
    }

    #[test]
    fn test_level_and_nonce_separate_keys() {
        let secret = LevelSecret::from_bytes([0x42; 32]);
        let secure_a =
            derive_level_keys(EncryptionLevel::Secure, &secret, &context(), Some(&[1; 32]))
                .unwrap();
        let secure_b =
            derive_level_keys(EncryptionLevel::Secure, &secret, &context(), Some(&[2; 32]))
                .unwrap();
        let forward =
            derive_level_keys(EncryptionLevel::ForwardSecure, &secret, &context(), None).unwrap();

        assert_ne!(secure_a.client_write, secure_b.client_write);
        assert_ne!(secure_a.client_write, forward.client_write);
    }

    #[test]
    fn test_identity_binding() {
        let secret = LevelSecret::from_bytes([0x42; 32]);
        let mut other = context();
        other.server_public = [0x03; 32];
        let a = derive_level_keys(EncryptionLevel::ForwardSecure, &secret, &context(), None)
            .unwrap();
        let b = derive_level_keys(EncryptionLevel::ForwardSecure, &secret, &other, None).unwrap();
        assert_ne!(a.client_write, b.client_write);
    }

    #[test]
    fn test_perspective_split() {
        let secret = LevelSecret::from_bytes([0x42; 32]);
        let client = derive_level_keys(EncryptionLevel::ForwardSecure, &secret, &context(), None)
            .unwrap()
            .for_perspective(Perspective::Client);
        let server = derive_level_keys(EncryptionLevel::ForwardSecure, &secret, &context(), None)
            .unwrap()
            .for_perspective(Perspective::Server);
        assert_eq!(client.0, server.1);
        assert_eq!(client.1, server.0);
    }

    #[test]
    fn test_unencrypted_has_no_schedule() {
        let secret = LevelSecret::from_bytes([0x42; 32]);
        assert!(
            derive_level_keys(EncryptionLevel::Unencrypted, &secret, &context(), None).is_err()
        );
    }
}

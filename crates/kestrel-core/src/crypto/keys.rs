// ============================================
// File: crates/kestrel-core/src/crypto/keys.rs
// ============================================
//! # Cryptographic Key Types
//!
//! ## Creation Reason
//! Key types used by the handshake and the per-level packet protection,
//! with the security properties they need (zeroize on drop, redacted
//! `Debug`).
//!
//! ## Main Functionality
//! - `IdentityKeyPair` / `IdentityPublicKey`: long-term Ed25519 keys
//! - `StaticKeyPair`: the server's X25519 configuration key
//! - `EphemeralKeyPair`: single-use X25519 keys
//! - `LevelSecret`: Diffie-Hellman output feeding one level's schedule
//! - `PacketKey`: one direction's AEAD key and IV
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  IdentityKeyPair (long-term)     signs hello / finished    │
//! │  StaticKeyPair (per server)      DH for the Secure level   │
//! │  EphemeralKeyPair (per handshake) DH for the Secure level  │
//! │                                  and ForwardSecure level   │
//! │  LevelSecret ──HKDF──► PacketKey (client_write, server_write)
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL secret key types MUST zeroize
//! - Private keys and derived keys must NEVER reach a log line
//! - Reject non-contributory DH results (low-order peer points)
//!
//! ## Last Modified
//! v0.1.0 - Initial key type definitions

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{
    AEAD_IV_SIZE, AEAD_KEY_SIZE, ED25519_PUBLIC_KEY_SIZE, ED25519_SIGNATURE_SIZE,
    X25519_PUBLIC_KEY_SIZE,
};
use crate::error::{CoreError, Result};

// ============================================
// IdentityKeyPair (Ed25519)
// ============================================

/// Long-term Ed25519 identity key pair for signing.
///
/// # Example
/// ```
/// use kestrel_core::crypto::IdentityKeyPair;
///
/// let identity = IdentityKeyPair::generate();
/// let signature = identity.sign(b"hello");
/// assert!(identity.public_key().verify(b"hello", &signature).is_ok());
/// ```
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    /// Generates a new random identity key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates an identity key pair from a 32-byte seed.
    ///
    /// # Errors
    /// Returns `InvalidKey` if the length is wrong.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut seed: [u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::invalid_key(format!(
                "Ed25519 seed must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    /// Returns the public key component.
    #[must_use]
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey(self.signing_key.verifying_key())
    }

    /// Returns the raw public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Signs a message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; ED25519_SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Exports the private seed for secure storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// ============================================
// IdentityPublicKey
// ============================================

/// Public component of an Ed25519 identity key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdentityPublicKey(VerifyingKey);

impl IdentityPublicKey {
    /// Creates a public key from raw bytes.
    ///
    /// # Errors
    /// Returns `InvalidKey` if the bytes are not a valid point.
    pub fn from_bytes(bytes: &[u8; ED25519_PUBLIC_KEY_SIZE]) -> Result<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| CoreError::invalid_key("Ed25519 public key"))
    }

    /// Returns the raw public key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ED25519_PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }

    /// Verifies a signature against this public key.
    ///
    /// # Errors
    /// Returns `SignatureVerification` if verification fails.
    pub fn verify(&self, message: &[u8], signature: &[u8; ED25519_SIGNATURE_SIZE]) -> Result<()> {
        let sig = Signature::from_bytes(signature);
        self.0
            .verify(message, &sig)
            .map_err(|_| CoreError::SignatureVerification)
    }
}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.as_bytes();
        write!(
            f,
            "IdentityPublicKey({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

impl fmt::Display for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BASE64.encode(self.0.as_bytes()))
    }
}

impl Serialize for IdentityPublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&BASE64.encode(self.0.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for IdentityPublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = BASE64.decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; ED25519_PUBLIC_KEY_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::invalid_length(bytes.len(), &"32 bytes"))?;
        Self::from_bytes(&arr).map_err(serde::de::Error::custom)
    }
}

// ============================================
// StaticKeyPair (X25519)
// ============================================

/// Reusable X25519 key pair advertised as the server configuration key.
pub struct StaticKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl StaticKeyPair {
    /// Generates a new random static key pair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restores a static key pair from its private bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Returns the public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; X25519_PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Performs Diffie-Hellman with a peer's public key.
    ///
    /// # Errors
    /// Returns `InvalidKey` for a non-contributory result.
    pub fn exchange(&self, peer_public: &[u8; X25519_PUBLIC_KEY_SIZE]) -> Result<LevelSecret> {
        let shared = self.secret.diffie_hellman(&X25519PublicKey::from(*peer_public));
        LevelSecret::from_shared(&shared)
    }
}

impl fmt::Debug for StaticKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeyPair")
            .field("public", &hex::encode(&self.public.as_bytes()[..4]))
            .finish_non_exhaustive()
    }
}

// ============================================
// EphemeralKeyPair (X25519)
// ============================================

/// Single-use X25519 key pair.
///
/// `exchange` consumes the pair so the private key cannot be reused.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generates a new random ephemeral key pair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Returns the public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; X25519_PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Performs Diffie-Hellman with a peer's public key.
    ///
    /// # Errors
    /// Returns `InvalidKey` for a non-contributory result.
    pub fn exchange(self, peer_public: &[u8; X25519_PUBLIC_KEY_SIZE]) -> Result<LevelSecret> {
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(*peer_public));
        LevelSecret::from_shared(&shared)
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &hex::encode(&self.public.as_bytes()[..4]))
            .finish_non_exhaustive()
    }
}

// ============================================
// LevelSecret
// ============================================

/// Shared secret that seeds one encryption level's key schedule.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LevelSecret([u8; 32]);

impl LevelSecret {
    /// Wraps raw secret bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn from_shared(shared: &SharedSecret) -> Result<Self> {
        if !shared.was_contributory() {
            return Err(CoreError::invalid_key("non-contributory X25519 public key"));
        }
        Ok(Self(*shared.as_bytes()))
    }

    /// Returns the raw secret bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for LevelSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LevelSecret([REDACTED])")
    }
}

// ============================================
// PacketKey
// ============================================

/// AEAD key and IV for one direction of one encryption level.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PacketKey {
    key: [u8; AEAD_KEY_SIZE],
    iv: [u8; AEAD_IV_SIZE],
}

impl PacketKey {
    /// Creates a packet key from its parts.
    #[must_use]
    pub const fn new(key: [u8; AEAD_KEY_SIZE], iv: [u8; AEAD_IV_SIZE]) -> Self {
        Self { key, iv }
    }

    /// AEAD key bytes.
    #[must_use]
    pub const fn key(&self) -> &[u8; AEAD_KEY_SIZE] {
        &self.key
    }

    /// Per-level IV, XORed with the packet number to form each nonce.
    #[must_use]
    pub const fn iv(&self) -> &[u8; AEAD_IV_SIZE] {
        &self.iv
    }
}

impl fmt::Debug for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PacketKey([REDACTED])")
    }
}

// Constant-time equality comparison
impl PartialEq for PacketKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        (self.key.ct_eq(&other.key) & self.iv.ct_eq(&other.iv)).into()
    }
}

impl Eq for PacketKey {}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_sign_verify() {
        let kp = IdentityKeyPair::generate();
        let signature = kp.sign(b"test message");
        assert!(kp.public_key().verify(b"test message", &signature).is_ok());
        assert!(matches!(
            kp.public_key().verify(b"wrong message", &signature),
            Err(CoreError::SignatureVerification)
        ));
    }

    #[test]
    fn test_identity_keypair_restore() {
        let kp = IdentityKeyPair::generate();
        let restored = IdentityKeyPair::from_bytes(&kp.to_bytes()).unwrap();
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
        assert!(IdentityKeyPair::from_bytes(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_identity_public_key_serialization() {
        let public = IdentityKeyPair::generate().public_key();
        let json = serde_json::to_string(&public).unwrap();
        let restored: IdentityPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(public, restored);
    }

    #[test]
    fn test_static_and_ephemeral_agree() {
        let server = StaticKeyPair::generate();
        let client = EphemeralKeyPair::generate();
        let client_public = client.public_key_bytes();

        let client_secret = client.exchange(&server.public_key_bytes()).unwrap();
        let server_secret = server.exchange(&client_public).unwrap();
        assert_eq!(client_secret.as_bytes(), server_secret.as_bytes());
    }

    #[test]
    fn test_low_order_point_rejected() {
        let client = EphemeralKeyPair::generate();
        assert!(matches!(
            client.exchange(&[0u8; 32]),
            Err(CoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = PacketKey::new([0x42; 32], [0x24; 12]);
        let secret = LevelSecret::from_bytes([0x42; 32]);
        assert!(!format!("{key:?}").contains("42"));
        assert!(!format!("{secret:?}").contains("42"));
    }

    #[test]
    fn test_static_key_restore() {
        let original = StaticKeyPair::generate();
        let bytes = original.secret.to_bytes();
        let restored = StaticKeyPair::from_bytes(bytes);
        assert_eq!(original.public_key_bytes(), restored.public_key_bytes());
    }
}

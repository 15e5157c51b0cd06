// ============================================
// File: crates/kestrel-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes the cryptographic operations behind the handshake and the
//! per-level packet protection, using audited RustCrypto and dalek
//! implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`keys`]: key types (Ed25519, X25519, derived packet keys)
//! - [`kdf`]: per-level key schedule (HKDF-SHA256)
//! - [`protection`]: packet sealing and opening
//! - [`handshake`]: the default client and server handshake engines
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Unencrypted    NullProtection (truncated SHA-256)          │
//! │                                                             │
//! │  Secure         X25519(client initial, server config key)   │
//! │                 + diversification nonce ──HKDF──► ChaCha20  │
//! │                                                             │
//! │  ForwardSecure  X25519(client forward, server ephemeral)    │
//! │                 ──HKDF──► ChaCha20-Poly1305                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER roll your own crypto
//! - ALL sensitive keys implement Zeroize
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod handshake;
pub mod kdf;
pub mod keys;
pub mod protection;

pub use handshake::{ClientHandshake, ServerHandshake};
pub use kdf::{derive_level_keys, KeyContext, LevelKeys};
pub use keys::{
    EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, LevelSecret, PacketKey,
    StaticKeyPair,
};
pub use protection::{AeadProtection, NullProtection, PacketProtection};

// ============================================
// Constants
// ============================================

/// Size of Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 signature in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Size of X25519 public key in bytes.
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of ChaCha20-Poly1305 key in bytes.
pub const AEAD_KEY_SIZE: usize = 32;

/// Size of the per-level IV (equal to the AEAD nonce) in bytes.
pub const AEAD_IV_SIZE: usize = 12;

/// Size of Poly1305 authentication tag in bytes.
pub const POLY1305_TAG_SIZE: usize = 16;

/// Size of the `Unencrypted` level's integrity tag in bytes.
pub const NULL_TAG_SIZE: usize = 12;

/// HKDF info prefix for level key expansion.
pub const HKDF_INFO_PREFIX: &[u8] = b"kestrel key expansion";

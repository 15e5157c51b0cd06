// ============================================
// File: crates/kestrel-core/src/lib.rs
// ============================================
//! # Kestrel Core - Handshake & Packet Protection
//!
//! ## Creation Reason
//! The cryptographic core of a kestrel connection: encryption levels, the
//! handshake that installs them, and authenticated seal/open of every
//! packet.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - `EncryptionLevel` and its total order
//! - Handshake messages, codec and framing
//! - Version lists passed explicitly to each connection
//!
//! ### Crypto Module ([`crypto`])
//! - Key types (`IdentityKeyPair`, `StaticKeyPair`, `EphemeralKeyPair`)
//! - Per-level key schedule (HKDF-SHA256)
//! - Packet protection (ChaCha20-Poly1305, null protection)
//! - Default client and server handshake engines
//!
//! ### Setup Module ([`setup`])
//! - `CryptoSetup`: open, seal, forced-level seal, sealing lock
//! - `handle_crypto_stream`: handshake loop
//! - `DiversificationNonce`
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              kestrel-session                        │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │   kestrel-core   ───►  kestrel-transport            │
//! │   You are here               │                      │
//! │         │                    │                      │
//! │         └──────────┬─────────┘                      │
//! │                    ▼                                │
//! │             kestrel-common                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Guarantees
//! - **Confidentiality**: ChaCha20-Poly1305 at `Secure` and above
//! - **Authenticity**: Ed25519 signatures over the handshake transcript
//! - **Forward Secrecy**: ephemeral X25519 for `ForwardSecure`
//! - **Nonce Uniqueness**: nonce = level IV XOR packet number
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL cryptographic code uses audited RustCrypto/dalek crates
//! - ALL keys MUST implement Zeroize
//! - Levels only move forward; installed keys are never replaced
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;
pub mod setup;

pub use crypto::{ClientHandshake, IdentityKeyPair, ServerHandshake, StaticKeyPair};
pub use error::{CoreError, Result};
pub use protocol::{EncryptionLevel, SupportedVersions, Version};
pub use setup::{
    CryptoSetup, CryptoSetupConfig, DiversificationNonce, HandshakeEngine, OpenPolicy,
    SealingGuard,
};

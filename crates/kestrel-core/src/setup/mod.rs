// ============================================
// File: crates/kestrel-core/src/setup/mod.rs
// ============================================
//! # Crypto Setup Module
//!
//! ## Creation Reason
//! Owns a connection's progression through the encryption levels and
//! the packet protection applied at each of them.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`crypto_setup`]: open/seal engine and the sealing lock
//! - [`stream_handler`]: handshake loop over the crypto stream
//! - [`state`]: append-only per-connection level storage
//! - [`engine`]: pluggable handshake engine interface
//! - [`nonce`]: diversification nonce
//!
//! ## Level Progression
//! ```text
//! Unencrypted ──(Secure keys + nonce)──► Secure ──(FS keys)──► ForwardSecure
//!                                                               + complete
//! ```
//! The crypto setup never advances on its own; only the stream handler
//! installs keys, as the engine reports them.
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto setup module

pub mod crypto_setup;
pub mod engine;
pub mod nonce;
pub mod state;
pub mod stream_handler;

pub use crypto_setup::{CryptoSetup, CryptoSetupConfig, OpenPolicy, SealingGuard};
pub use engine::{HandshakeEngine, HandshakeEvent, KeyMaterial};
pub use nonce::{DiversificationNonce, DIVERSIFICATION_NONCE_SIZE};
pub use state::{ConnectionCryptoState, InstalledLevel};

// ============================================
// File: crates/kestrel-core/src/setup/nonce.rs
// ============================================
//! Diversification nonce: a per-connection random value mixed into the
//! `Secure` level keys so two connections never share them.

use std::fmt;

use rand::{rngs::OsRng, RngCore};

/// Size of a diversification nonce in bytes.
pub const DIVERSIFICATION_NONCE_SIZE: usize = 32;

/// Connection-specific value mixed into the `Secure` key schedule.
///
/// Generated by the server when it derives `Secure` keys, sent to the
/// client in the ServerHello, and immutable afterwards.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DiversificationNonce([u8; DIVERSIFICATION_NONCE_SIZE]);

impl DiversificationNonce {
    /// Draws a fresh nonce from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; DIVERSIFICATION_NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps a nonce received from the peer.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DIVERSIFICATION_NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the nonce bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIVERSIFICATION_NONCE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for DiversificationNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiversificationNonce({}...)", hex::encode(&self.0[..4]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_nonces_differ() {
        let a = DiversificationNonce::generate();
        let b = DiversificationNonce::generate();
        assert_ne!(a, b);
        assert_ne!(a.as_bytes(), &[0u8; DIVERSIFICATION_NONCE_SIZE]);
    }

    #[test]
    fn test_from_bytes_preserves_value() {
        let nonce = DiversificationNonce::from_bytes([7; DIVERSIFICATION_NONCE_SIZE]);
        assert_eq!(nonce.as_bytes(), &[7; DIVERSIFICATION_NONCE_SIZE]);
    }
}

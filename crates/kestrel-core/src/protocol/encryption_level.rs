// ============================================
// File: crates/kestrel-core/src/protocol/encryption_level.rs
// ============================================
//! # Encryption Levels
//!
//! ## Creation Reason
//! Names the stages of connection security strength and gives them the
//! total order used to decide when stronger protection supersedes weaker.
//!
//! ## Ordering
//! ```text
//! Unspecified < Unencrypted < Secure < ForwardSecure
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Unspecified` never protects a packet. As a seal argument it means
//!   "use the current level".
//! - The discriminants are stored in an `AtomicU8` by the crypto state;
//!   keep `from_u8` in sync when adding variants.
//!
//! ## Last Modified
//! v0.1.0 - Initial level definitions

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================
// EncryptionLevel
// ============================================

/// Security strength of a packet's protection.
///
/// # Example
/// ```
/// use kestrel_core::protocol::EncryptionLevel;
///
/// assert!(EncryptionLevel::Secure < EncryptionLevel::ForwardSecure);
/// assert_eq!(EncryptionLevel::Secure.to_string(), "encrypted");
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EncryptionLevel {
    /// No level requested; never used for protection.
    #[default]
    Unspecified = 0,
    /// Integrity-only protection before any key exchange.
    Unencrypted = 1,
    /// Encrypted under keys from the server's static configuration key.
    Secure = 2,
    /// Encrypted under keys from ephemeral key exchange.
    ForwardSecure = 3,
}

impl EncryptionLevel {
    /// Levels that can hold key material, weakest first.
    pub const INSTALLABLE: [Self; 3] = [Self::Unencrypted, Self::Secure, Self::ForwardSecure];

    /// Returns the wire/atomic representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts from the wire/atomic representation.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Unencrypted),
            2 => Some(Self::Secure),
            3 => Some(Self::ForwardSecure),
            _ => None,
        }
    }

    /// `false` only for `Unspecified`.
    #[must_use]
    pub const fn is_specified(self) -> bool {
        !matches!(self, Self::Unspecified)
    }

    /// Slot index for per-level storage, `None` for `Unspecified`.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Unspecified => None,
            Self::Unencrypted => Some(0),
            Self::Secure => Some(1),
            Self::ForwardSecure => Some(2),
        }
    }

    /// The next weaker installable level.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::Unspecified | Self::Unencrypted => None,
            Self::Secure => Some(Self::Unencrypted),
            Self::ForwardSecure => Some(Self::Secure),
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unspecified => "unknown",
            Self::Unencrypted => "unencrypted",
            Self::Secure => "encrypted",
            Self::ForwardSecure => "forward encrypted",
        }
    }
}

impl fmt::Display for EncryptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<u8> for EncryptionLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(value)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        use EncryptionLevel::*;
        let mut levels = vec![ForwardSecure, Unspecified, Secure, Unencrypted];
        levels.sort();
        assert_eq!(levels, vec![Unspecified, Unencrypted, Secure, ForwardSecure]);
    }

    #[test]
    fn test_labels() {
        assert_eq!(EncryptionLevel::Unspecified.to_string(), "unknown");
        assert_eq!(EncryptionLevel::Unencrypted.to_string(), "unencrypted");
        assert_eq!(EncryptionLevel::Secure.to_string(), "encrypted");
        assert_eq!(EncryptionLevel::ForwardSecure.to_string(), "forward encrypted");
    }

    #[test]
    fn test_u8_conversion() {
        for level in EncryptionLevel::INSTALLABLE {
            assert_eq!(EncryptionLevel::from_u8(level.as_u8()), Some(level));
        }
        assert_eq!(EncryptionLevel::try_from(9), Err(9));
    }

    #[test]
    fn test_index_and_previous() {
        assert_eq!(EncryptionLevel::Unspecified.index(), None);
        assert_eq!(EncryptionLevel::ForwardSecure.index(), Some(2));
        assert_eq!(
            EncryptionLevel::ForwardSecure.previous(),
            Some(EncryptionLevel::Secure)
        );
        assert_eq!(EncryptionLevel::Unencrypted.previous(), None);
    }

    #[test]
    fn test_default_is_unspecified() {
        assert!(!EncryptionLevel::default().is_specified());
    }
}

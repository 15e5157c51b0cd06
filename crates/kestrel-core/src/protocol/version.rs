// ============================================
// File: crates/kestrel-core/src/protocol/version.rs
// ============================================
//! # Protocol Versioning
//!
//! ## Creation Reason
//! Carries the set of handshake versions an endpoint accepts, so every
//! connection is constructed with an explicit version list instead of
//! consulting process-wide state.
//!
//! ## Main Functionality
//! - `Version`: 32-bit version tag carried in the hello messages
//! - `SupportedVersions`: ordered preference list with negotiation
//!
//! ## Version History
//! | Version | Description |
//! |---------|-------------|
//! | K001    | Initial handshake (Ed25519 + X25519, ChaCha20-Poly1305) |
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALWAYS add a new version for wire format changes
//! - Tests build their own `SupportedVersions`; never introduce a global
//!
//! ## Last Modified
//! v0.1.0 - Initial version definitions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

// ============================================
// Constants
// ============================================

/// Current handshake version.
pub const CURRENT_VERSION: Version = Version(1);

// ============================================
// Version
// ============================================

/// Handshake version identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u32);

impl Version {
    /// Creates a version from its wire value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        CURRENT_VERSION
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{:03}", self.0)
    }
}

impl From<u32> for Version {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// ============================================
// SupportedVersions
// ============================================

/// Versions an endpoint accepts, most preferred first.
///
/// # Example
/// ```
/// use kestrel_core::protocol::{SupportedVersions, Version};
///
/// let ours = SupportedVersions::new(vec![Version::new(2), Version::new(1)]).unwrap();
/// assert_eq!(ours.negotiate(&[Version::new(1)]), Some(Version::new(1)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Version>", into = "Vec<Version>")]
pub struct SupportedVersions(Vec<Version>);

impl SupportedVersions {
    /// Creates a version list.
    ///
    /// # Errors
    /// Returns `MalformedMessage` if the list is empty or has duplicates.
    pub fn new(versions: Vec<Version>) -> Result<Self> {
        if versions.is_empty() {
            return Err(CoreError::malformed("version list is empty"));
        }
        for (i, v) in versions.iter().enumerate() {
            if versions[..i].contains(v) {
                return Err(CoreError::malformed(format!("duplicate version {v}")));
            }
        }
        Ok(Self(versions))
    }

    /// Returns `true` if `version` is accepted.
    #[must_use]
    pub fn contains(&self, version: Version) -> bool {
        self.0.contains(&version)
    }

    /// Most preferred version.
    #[must_use]
    pub fn preferred(&self) -> Version {
        // Non-empty by construction.
        self.0.first().copied().unwrap_or_default()
    }

    /// Picks our most preferred version that the peer also offers.
    #[must_use]
    pub fn negotiate(&self, offered: &[Version]) -> Option<Version> {
        self.0.iter().copied().find(|v| offered.contains(v))
    }

    /// Iterates in preference order.
    pub fn iter(&self) -> impl Iterator<Item = Version> + '_ {
        self.0.iter().copied()
    }
}

impl Default for SupportedVersions {
    fn default() -> Self {
        Self(vec![CURRENT_VERSION])
    }
}

impl TryFrom<Vec<Version>> for SupportedVersions {
    type Error = CoreError;

    fn try_from(versions: Vec<Version>) -> Result<Self> {
        Self::new(versions)
    }
}

impl From<SupportedVersions> for Vec<Version> {
    fn from(versions: SupportedVersions) -> Self {
        versions.0
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_display() {
        assert_eq!(CURRENT_VERSION.to_string(), "K001");
        assert_eq!(Version::new(42).to_string(), "K042");
    }

    #[test]
    fn test_supported_versions_rejects_bad_lists() {
        assert!(SupportedVersions::new(vec![]).is_err());
        assert!(SupportedVersions::new(vec![Version::new(1), Version::new(1)]).is_err());
    }

    #[test]
    fn test_negotiate_prefers_our_order() {
        let ours =
            SupportedVersions::new(vec![Version::new(3), Version::new(2), Version::new(1)])
                .unwrap();
        assert_eq!(
            ours.negotiate(&[Version::new(1), Version::new(2)]),
            Some(Version::new(2))
        );
        assert_eq!(ours.negotiate(&[Version::new(9)]), None);
        assert_eq!(ours.preferred(), Version::new(3));
    }

    #[test]
    fn test_independent_lists_do_not_interfere() {
        let a = SupportedVersions::new(vec![Version::new(1)]).unwrap();
        let b = SupportedVersions::new(vec![Version::new(2)]).unwrap();
        assert!(a.contains(Version::new(1)));
        assert!(!b.contains(Version::new(1)));
    }

    #[test]
    fn test_serde_validates() {
        let ok: SupportedVersions = serde_json::from_str("[2, 1]").unwrap();
        assert_eq!(ok.preferred(), Version::new(2));
        assert!(serde_json::from_str::<SupportedVersions>("[]").is_err());
    }
}

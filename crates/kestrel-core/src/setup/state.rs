// ============================================
// File: crates/kestrel-core/src/setup/state.rs
// ============================================
//! # Connection Crypto State
//!
//! ## Creation Reason
//! Per-connection record of installed encryption levels, the current
//! sealing level, the diversification nonce and handshake completion.
//!
//! ## Concurrency Model
//! ```text
//! levels[]        OnceLock per level, append-only, read lock-free
//! current         AtomicU8, written only while holding seal_lock
//! install_lock    serializes installs (monotonic checks)
//! seal_lock       held by every seal; promotion waits for it
//! level_tx        watch channel, republished after each promotion
//! ```
//! Installation publishes the level's keys first and only then advances
//! `current`, so any reader that observes a level as current also
//! observes its keys.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never remove or replace an installed level
//! - Never store `current` without holding `seal_lock`
//! - Never hold `seal_lock` while waiting on `install_lock`
//!
//! ## Last Modified
//! v0.1.0 - Initial state implementation

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;

use kestrel_common::Perspective;

use crate::crypto::{NullProtection, PacketProtection};
use crate::error::{CoreError, Result};
use crate::protocol::EncryptionLevel;
use crate::setup::nonce::DiversificationNonce;

// ============================================
// InstalledLevel
// ============================================

/// Sealer and opener for one installed level.
pub struct InstalledLevel {
    level: EncryptionLevel,
    sealer: Box<dyn PacketProtection>,
    opener: Box<dyn PacketProtection>,
}

impl InstalledLevel {
    /// Bundles one level's two directions.
    #[must_use]
    pub fn new(
        level: EncryptionLevel,
        sealer: Box<dyn PacketProtection>,
        opener: Box<dyn PacketProtection>,
    ) -> Self {
        Self {
            level,
            sealer,
            opener,
        }
    }

    /// Level these keys protect.
    #[must_use]
    pub const fn level(&self) -> EncryptionLevel {
        self.level
    }

    /// Protection for outgoing packets.
    #[must_use]
    pub fn sealer(&self) -> &dyn PacketProtection {
        self.sealer.as_ref()
    }

    /// Protection for incoming packets.
    #[must_use]
    pub fn opener(&self) -> &dyn PacketProtection {
        self.opener.as_ref()
    }
}

impl fmt::Debug for InstalledLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledLevel")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

// ============================================
// ConnectionCryptoState
// ============================================

/// Shared crypto state of one connection.
pub struct ConnectionCryptoState {
    perspective: Perspective,
    levels: [OnceLock<InstalledLevel>; 3],
    current: AtomicU8,
    peer_highest: AtomicU8,
    install_lock: Mutex<()>,
    seal_lock: Mutex<()>,
    diversification_nonce: OnceLock<DiversificationNonce>,
    handshake_complete: AtomicBool,
    level_tx: watch::Sender<EncryptionLevel>,
}

impl ConnectionCryptoState {
    /// Creates the state at `Unencrypted` with null protection installed.
    #[must_use]
    pub fn new(perspective: Perspective) -> Self {
        let unencrypted = OnceLock::new();
        let _ = unencrypted.set(InstalledLevel::new(
            EncryptionLevel::Unencrypted,
            Box::new(NullProtection::new(perspective)),
            Box::new(NullProtection::new(perspective.opposite())),
        ));
        Self {
            perspective,
            levels: [unencrypted, OnceLock::new(), OnceLock::new()],
            current: AtomicU8::new(EncryptionLevel::Unencrypted.as_u8()),
            peer_highest: AtomicU8::new(EncryptionLevel::Unspecified.as_u8()),
            install_lock: Mutex::new(()),
            seal_lock: Mutex::new(()),
            diversification_nonce: OnceLock::new(),
            handshake_complete: AtomicBool::new(false),
            level_tx: watch::Sender::new(EncryptionLevel::Unencrypted),
        }
    }

    /// Which side owns this state.
    #[must_use]
    pub const fn perspective(&self) -> Perspective {
        self.perspective
    }

    /// Highest installed level, used for sealing new packets.
    #[must_use]
    pub fn current_level(&self) -> EncryptionLevel {
        EncryptionLevel::from_u8(self.current.load(Ordering::Acquire))
            .unwrap_or(EncryptionLevel::Unencrypted)
    }

    /// Highest level a packet from the peer has been opened at.
    #[must_use]
    pub fn peer_highest_level(&self) -> EncryptionLevel {
        EncryptionLevel::from_u8(self.peer_highest.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub(crate) fn record_peer_level(&self, level: EncryptionLevel) {
        self.peer_highest.fetch_max(level.as_u8(), Ordering::AcqRel);
    }

    /// Keys for `level`, if installed.
    #[must_use]
    pub fn level(&self, level: EncryptionLevel) -> Option<&InstalledLevel> {
        level.index().and_then(|i| self.levels[i].get())
    }

    /// Levels installed so far, weakest first.
    #[must_use]
    pub fn installed_levels(&self) -> Vec<EncryptionLevel> {
        self.levels
            .iter()
            .filter_map(|slot| slot.get().map(InstalledLevel::level))
            .collect()
    }

    /// Installs a level and makes it current.
    ///
    /// # Errors
    /// Returns `InvalidState` if `installed` is not above the current
    /// level, or if the nonce accompanies a level other than `Secure`.
    pub fn install(
        &self,
        installed: InstalledLevel,
        diversification_nonce: Option<DiversificationNonce>,
    ) -> Result<()> {
        let _install = self.install_lock.lock();

        let level = installed.level();
        let current = self.current_level();
        let Some(index) = level.index().filter(|_| level > current) else {
            return Err(CoreError::invalid_state(
                format!("install {level} keys"),
                format!("a level above {current}"),
            ));
        };

        if let Some(nonce) = diversification_nonce {
            if level != EncryptionLevel::Secure {
                return Err(CoreError::invalid_state(
                    format!("attach diversification nonce to {level} keys"),
                    "encrypted level",
                ));
            }
            if self.diversification_nonce.set(nonce).is_err() {
                return Err(CoreError::invalid_state(
                    "record diversification nonce",
                    "no nonce recorded yet",
                ));
            }
        }

        if self.levels[index].set(installed).is_err() {
            return Err(CoreError::invalid_state(
                format!("install {level} keys"),
                "level not yet installed",
            ));
        }

        // Keys are visible; only now advance the sealing level.
        let seal = self.seal_lock.lock();
        self.current.store(level.as_u8(), Ordering::Release);
        drop(seal);
        self.level_tx.send_replace(level);
        Ok(())
    }

    /// Watches the sealing level. The receiver sees every promotion made
    /// after it was created, though fast successive ones may coalesce.
    #[must_use]
    pub fn subscribe_levels(&self) -> watch::Receiver<EncryptionLevel> {
        self.level_tx.subscribe()
    }

    /// Blocks promotion and returns the level in force while held.
    pub fn lock_for_sealing(&self) -> (MutexGuard<'_, ()>, EncryptionLevel) {
        let guard = self.seal_lock.lock();
        let level = self.current_level();
        (guard, level)
    }

    /// Diversification nonce, once recorded.
    #[must_use]
    pub fn diversification_nonce(&self) -> Option<&DiversificationNonce> {
        self.diversification_nonce.get()
    }

    /// `true` once the handshake completed.
    #[must_use]
    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete.load(Ordering::Acquire)
    }

    /// Flips the completion flag exactly once.
    ///
    /// # Errors
    /// Returns `InvalidState` if `ForwardSecure` keys are missing or the
    /// flag is already set.
    pub fn mark_complete(&self) -> Result<()> {
        if self.level(EncryptionLevel::ForwardSecure).is_none() {
            return Err(CoreError::invalid_state(
                "complete handshake",
                "forward secure keys installed",
            ));
        }
        self.handshake_complete
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| CoreError::invalid_state("complete handshake", "incomplete handshake"))
    }
}

impl fmt::Debug for ConnectionCryptoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCryptoState")
            .field("perspective", &self.perspective)
            .field("current", &self.current_level())
            .field("installed", &self.installed_levels())
            .field("handshake_complete", &self.is_handshake_complete())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AeadProtection, PacketKey};

    fn level(level: EncryptionLevel) -> InstalledLevel {
        let key = PacketKey::new([level.as_u8(); 32], [0; 12]);
        InstalledLevel::new(
            level,
            Box::new(AeadProtection::new(&key)),
            Box::new(AeadProtection::new(&key)),
        )
    }

    #[test]
    fn test_starts_unencrypted() {
        let state = ConnectionCryptoState::new(Perspective::Client);
        assert_eq!(state.current_level(), EncryptionLevel::Unencrypted);
        assert_eq!(state.installed_levels(), vec![EncryptionLevel::Unencrypted]);
        assert!(state.diversification_nonce().is_none());
        assert!(!state.is_handshake_complete());
    }

    #[test]
    fn test_monotonic_install() {
        let state = ConnectionCryptoState::new(Perspective::Server);
        state
            .install(
                level(EncryptionLevel::Secure),
                Some(DiversificationNonce::generate()),
            )
            .unwrap();
        state
            .install(level(EncryptionLevel::ForwardSecure), None)
            .unwrap();

        assert!(state.install(level(EncryptionLevel::Secure), None).is_err());
        assert!(state
            .install(level(EncryptionLevel::ForwardSecure), None)
            .is_err());
        assert!(state
            .install(level(EncryptionLevel::Unspecified), None)
            .is_err());

        assert_eq!(
            state.installed_levels(),
            EncryptionLevel::INSTALLABLE.to_vec()
        );
        assert_eq!(state.current_level(), EncryptionLevel::ForwardSecure);
    }

    #[test]
    fn test_nonce_recorded_once() {
        let state = ConnectionCryptoState::new(Perspective::Server);
        let nonce = DiversificationNonce::generate();
        state
            .install(level(EncryptionLevel::Secure), Some(nonce))
            .unwrap();
        assert_eq!(state.diversification_nonce(), Some(&nonce));

        let err = state.install(
            level(EncryptionLevel::ForwardSecure),
            Some(DiversificationNonce::generate()),
        );
        assert!(err.is_err());
        assert_eq!(state.diversification_nonce(), Some(&nonce));
        assert_eq!(state.current_level(), EncryptionLevel::Secure);
    }

    #[test]
    fn test_mark_complete_exactly_once() {
        let state = ConnectionCryptoState::new(Perspective::Client);
        assert!(state.mark_complete().is_err());

        state
            .install(level(EncryptionLevel::ForwardSecure), None)
            .unwrap();
        assert!(state.mark_complete().is_ok());
        assert!(state.mark_complete().is_err());
        assert!(state.is_handshake_complete());
    }

    #[test]
    fn test_peer_level_only_rises() {
        let state = ConnectionCryptoState::new(Perspective::Client);
        state.record_peer_level(EncryptionLevel::Secure);
        state.record_peer_level(EncryptionLevel::Unencrypted);
        assert_eq!(state.peer_highest_level(), EncryptionLevel::Secure);
    }

    #[test]
    fn test_level_watch_follows_promotion() {
        let state = ConnectionCryptoState::new(Perspective::Client);
        let mut levels = state.subscribe_levels();
        assert_eq!(*levels.borrow(), EncryptionLevel::Unencrypted);

        state.install(level(EncryptionLevel::Secure), None).unwrap();
        assert!(levels.has_changed().unwrap());
        assert_eq!(*levels.borrow_and_update(), EncryptionLevel::Secure);

        // A failed install publishes nothing.
        assert!(state.install(level(EncryptionLevel::Secure), None).is_err());
        assert!(!levels.has_changed().unwrap());
    }
}

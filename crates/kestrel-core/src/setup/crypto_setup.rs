// ============================================
// File: crates/kestrel-core/src/setup/crypto_setup.rs
// ============================================
//! # Crypto Setup
//!
//! ## Creation Reason
//! Packet protection engine bound to one connection: authenticated open
//! and seal keyed by packet number and header, forced-level sealing for
//! retransmissions, and the scoped sealing lock.
//!
//! ## Main Functionality
//! - `open` / `open_into`: try the current level, then lower levels as
//!   allowed by `OpenPolicy`
//! - `seal` / `seal_into`: seal at the current or a forced level
//! - `lock_for_sealing`: freeze the current level across several seals
//! - `install_keys`: derive and publish a level's keys
//! - `handle_crypto_stream` (in `stream_handler`): drive the handshake
//!
//! ## Open Order
//! ```text
//! AllLower       current, current-1, ..., Unencrypted
//! PreviousOnly   current, current-1
//! CurrentOnly    current
//! ```
//! `Unencrypted` is never opened after the handshake completed. With
//! `retire_superseded_levels`, nothing below the highest level the peer
//! has been seen sending at is opened.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Open never says which levels it tried; every failure is the same
//!   `Decryption` error
//! - Seal never falls back to another level
//! - Do not call `seal` while holding a `SealingGuard` on the same
//!   connection; use the guard's own `seal`
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto setup
//! v0.1.1 - Retire levels below the peer's highest; refuse keyless
//!          packets after completion

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::MutexGuard;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use kestrel_common::{ConnectionId, PacketNumber, Perspective};

use crate::crypto::{derive_level_keys, AeadProtection};
use crate::error::{CoreError, Result};
use crate::protocol::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::protocol::EncryptionLevel;
use crate::setup::engine::KeyMaterial;
use crate::setup::nonce::DiversificationNonce;
use crate::setup::state::{ConnectionCryptoState, InstalledLevel};

// ============================================
// Configuration
// ============================================

/// Which levels `open` tries below the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenPolicy {
    /// Every installed level, strongest first.
    #[default]
    AllLower,
    /// The current level and the one immediately below it.
    PreviousOnly,
    /// The current level only.
    CurrentOnly,
}

impl OpenPolicy {
    const fn max_attempts(self) -> usize {
        match self {
            Self::AllLower => EncryptionLevel::INSTALLABLE.len(),
            Self::PreviousOnly => 2,
            Self::CurrentOnly => 1,
        }
    }
}

/// Per-connection crypto setup options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoSetupConfig {
    /// Levels tried by `open`.
    pub open_policy: OpenPolicy,
    /// Stop opening levels below the highest one the peer has sent at.
    pub retire_superseded_levels: bool,
    /// Largest handshake frame accepted from the crypto stream.
    pub max_frame_size: usize,
}

impl Default for CryptoSetupConfig {
    fn default() -> Self {
        Self {
            open_policy: OpenPolicy::default(),
            retire_superseded_levels: true,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

// ============================================
// CryptoSetup
// ============================================

/// Packet protection engine of one connection.
#[derive(Debug)]
pub struct CryptoSetup {
    connection_id: ConnectionId,
    state: Arc<ConnectionCryptoState>,
    pub(super) config: CryptoSetupConfig,
    pub(super) handshake_started: AtomicBool,
}

impl CryptoSetup {
    /// Creates the setup at `Unencrypted`.
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        perspective: Perspective,
        config: CryptoSetupConfig,
    ) -> Self {
        Self {
            connection_id,
            state: Arc::new(ConnectionCryptoState::new(perspective)),
            config,
            handshake_started: AtomicBool::new(false),
        }
    }

    /// Connection this setup protects.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Which side of the connection we are.
    #[must_use]
    pub fn perspective(&self) -> Perspective {
        self.state.perspective()
    }

    /// Options in force.
    #[must_use]
    pub const fn config(&self) -> &CryptoSetupConfig {
        &self.config
    }

    /// Shared state, for observers.
    #[must_use]
    pub fn state(&self) -> &Arc<ConnectionCryptoState> {
        &self.state
    }

    /// Current sealing level.
    #[must_use]
    pub fn encryption_level(&self) -> EncryptionLevel {
        self.state.current_level()
    }

    /// Highest level the peer has been seen sending at.
    #[must_use]
    pub fn peer_encryption_level(&self) -> EncryptionLevel {
        self.state.peer_highest_level()
    }

    /// Receiver that changes whenever the sealing level is promoted.
    #[must_use]
    pub fn subscribe_levels(&self) -> watch::Receiver<EncryptionLevel> {
        self.state.subscribe_levels()
    }

    /// Diversification nonce, once `Secure` keys exist.
    #[must_use]
    pub fn diversification_nonce(&self) -> Option<&DiversificationNonce> {
        self.state.diversification_nonce()
    }

    /// `true` once the handshake completed. Never resets.
    #[must_use]
    pub fn handshake_complete(&self) -> bool {
        self.state.is_handshake_complete()
    }

    // ========================================
    // Key Installation
    // ========================================

    /// Derives the keys described by `material` and promotes to its level.
    ///
    /// Called by the crypto stream handler as the handshake advances.
    ///
    /// # Errors
    /// - `KeyDerivation` for levels without a key schedule
    /// - `InvalidState` if the level is not above the current one
    pub fn install_keys(&self, material: KeyMaterial) -> Result<()> {
        let level = material.level;
        let nonce = material.diversification_nonce;
        let keys = derive_level_keys(
            level,
            &material.secret,
            &material.context,
            nonce.as_ref().map(DiversificationNonce::as_bytes),
        )?;
        let (seal_key, open_key) = keys.for_perspective(self.perspective());
        let installed = InstalledLevel::new(
            level,
            Box::new(AeadProtection::new(&seal_key)),
            Box::new(AeadProtection::new(&open_key)),
        );

        self.state.install(installed, nonce)?;
        info!(
            connection_id = %self.connection_id,
            perspective = %self.perspective(),
            %level,
            "Encryption level installed"
        );
        Ok(())
    }

    // ========================================
    // Open
    // ========================================

    /// Lowest level `open` still accepts.
    ///
    /// `Unencrypted` is keyless, so it is never accepted once the
    /// handshake completed.
    fn open_floor(&self) -> EncryptionLevel {
        let mut floor = if self.state.is_handshake_complete() {
            EncryptionLevel::Secure
        } else {
            EncryptionLevel::Unencrypted
        };
        if self.config.retire_superseded_levels {
            floor = floor.max(self.state.peer_highest_level());
        }
        floor
    }

    /// Opens a packet, appending the plaintext to `dst`.
    ///
    /// # Returns
    /// The level whose keys authenticated the packet.
    ///
    /// # Errors
    /// `Decryption` if no permitted level authenticates it. `dst` is left
    /// unchanged.
    pub fn open_into(
        &self,
        dst: &mut Vec<u8>,
        ciphertext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<EncryptionLevel> {
        let floor = self.open_floor();
        let mut candidate = Some(self.state.current_level());

        for _ in 0..self.config.open_policy.max_attempts() {
            let Some(level) = candidate.filter(|l| *l >= floor) else {
                break;
            };
            candidate = level.previous();

            let Some(installed) = self.state.level(level) else {
                continue;
            };
            if installed
                .opener()
                .open_into(dst, ciphertext, packet_number, associated_data)
                .is_ok()
            {
                self.state.record_peer_level(level);
                trace!(
                    connection_id = %self.connection_id,
                    packet_number = %packet_number,
                    %level,
                    "Packet opened"
                );
                return Ok(level);
            }
        }

        trace!(
            connection_id = %self.connection_id,
            packet_number = %packet_number,
            "Packet failed authentication"
        );
        Err(CoreError::Decryption)
    }

    /// Opens a packet into a fresh buffer.
    ///
    /// # Errors
    /// See [`CryptoSetup::open_into`].
    pub fn open(
        &self,
        ciphertext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
    ) -> Result<(Vec<u8>, EncryptionLevel)> {
        let mut plaintext = Vec::with_capacity(ciphertext.len());
        let level = self.open_into(&mut plaintext, ciphertext, packet_number, associated_data)?;
        Ok((plaintext, level))
    }

    // ========================================
    // Seal
    // ========================================

    /// Holds off level promotion until the guard is dropped.
    ///
    /// Dropping the guard is the unlock.
    pub fn lock_for_sealing(&self) -> SealingGuard<'_> {
        let (lock, level) = self.state.lock_for_sealing();
        SealingGuard {
            setup: self,
            level,
            _lock: lock,
        }
    }

    /// Seals a packet, appending the protected payload to `dst`.
    ///
    /// `forced_level` of `Unspecified` seals at the current level.
    ///
    /// # Errors
    /// `LevelNotAvailable` if the forced level's keys are not installed.
    pub fn seal_into(
        &self,
        dst: &mut Vec<u8>,
        plaintext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
        forced_level: EncryptionLevel,
    ) -> Result<EncryptionLevel> {
        self.lock_for_sealing()
            .seal_into(dst, plaintext, packet_number, associated_data, forced_level)
    }

    /// Seals a packet into a fresh buffer.
    ///
    /// # Errors
    /// See [`CryptoSetup::seal_into`].
    pub fn seal(
        &self,
        plaintext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
        forced_level: EncryptionLevel,
    ) -> Result<(Vec<u8>, EncryptionLevel)> {
        self.lock_for_sealing()
            .seal(plaintext, packet_number, associated_data, forced_level)
    }
}

// ============================================
// SealingGuard
// ============================================

/// Scoped hold on the sealing path.
///
/// While it lives, the current level and its keys cannot change.
#[must_use = "the sealing lock is released as soon as the guard is dropped"]
pub struct SealingGuard<'a> {
    setup: &'a CryptoSetup,
    level: EncryptionLevel,
    _lock: MutexGuard<'a, ()>,
}

impl SealingGuard<'_> {
    /// Level used for unforced seals while the guard is held.
    #[must_use]
    pub const fn encryption_level(&self) -> EncryptionLevel {
        self.level
    }

    /// Maps a requested level to the level a seal would use.
    ///
    /// # Errors
    /// `LevelNotAvailable` if the level is above the current one or its
    /// keys were never installed.
    pub fn resolve_level(&self, forced_level: EncryptionLevel) -> Result<EncryptionLevel> {
        if !forced_level.is_specified() {
            return Ok(self.level);
        }
        if forced_level > self.level || self.setup.state.level(forced_level).is_none() {
            return Err(CoreError::LevelNotAvailable {
                level: forced_level,
            });
        }
        Ok(forced_level)
    }

    /// Seals under the held lock, appending to `dst`.
    ///
    /// # Errors
    /// See [`CryptoSetup::seal_into`].
    pub fn seal_into(
        &self,
        dst: &mut Vec<u8>,
        plaintext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
        forced_level: EncryptionLevel,
    ) -> Result<EncryptionLevel> {
        let level = self.resolve_level(forced_level)?;
        let installed = self
            .setup
            .state
            .level(level)
            .ok_or(CoreError::LevelNotAvailable { level })?;

        installed
            .sealer()
            .seal_into(dst, plaintext, packet_number, associated_data)?;

        if forced_level.is_specified() && level != self.level {
            debug!(
                connection_id = %self.setup.connection_id,
                packet_number = %packet_number,
                %level,
                current = %self.level,
                "Sealed at forced level"
            );
        }
        Ok(level)
    }

    /// Seals under the held lock into a fresh buffer.
    ///
    /// # Errors
    /// See [`CryptoSetup::seal_into`].
    pub fn seal(
        &self,
        plaintext: &[u8],
        packet_number: PacketNumber,
        associated_data: &[u8],
        forced_level: EncryptionLevel,
    ) -> Result<(Vec<u8>, EncryptionLevel)> {
        let mut sealed = Vec::with_capacity(plaintext.len() + 16);
        let level =
            self.seal_into(&mut sealed, plaintext, packet_number, associated_data, forced_level)?;
        Ok((sealed, level))
    }

    /// Releases the lock. Same as dropping the guard.
    pub fn unlock(self) {}
}

// ============================================
// Tests
// ============================================

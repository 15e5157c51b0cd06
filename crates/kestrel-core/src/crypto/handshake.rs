// ============================================
// File: crates/kestrel-core/src/crypto/handshake.rs
// ============================================
//! # Default Handshake Engines
//!
//! ## Creation Reason
//! Signed Diffie-Hellman handshake that yields one secret for the
//! `Secure` level and one for the `ForwardSecure` level.
//!
//! ## Handshake Flow
//! ```text
//! Client                                          Server
//!   │  ClientHello                                  │
//!   │  ├─ client_public_key (Ed25519)               │
//!   │  ├─ client_initial_key / client_forward_key   │
//!   │  ├─ timestamp                                 │
//!   │  └─ signature ─────────────────────────────►  │
//!   │                           verify, check skew  │
//!   │                           generate nonce      │
//!   │                           install Secure      │
//!   │                                  ServerHello  │
//!   │  ◄────────────── config key, ephemeral key,   │
//!   │                  nonce, signature             │
//!   │  verify                                       │
//!   │  install Secure, ForwardSecure                │
//!   │  ClientFinished ───────────────────────────►  │
//!   │                           verify transcript   │
//!   │                           install ForwardSecure
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Signatures cover exactly `signed_bytes()` plus the transcript hash
//! - Timestamp validation limits replay of a captured ClientHello
//! - Every refusal is a `HandshakeRefused` so the peer learns why
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake engines

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use kestrel_common::time::Timestamp;
use kestrel_common::Perspective;

use crate::crypto::kdf::KeyContext;
use crate::crypto::keys::{
    EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, LevelSecret, StaticKeyPair,
};
use crate::error::{CoreError, Result};
use crate::protocol::messages::FINISHED_LABEL;
use crate::protocol::{
    ClientFinished, ClientHello, EncryptionLevel, HandshakeMessage, RejectReason, ServerHello,
    SupportedVersions, Version,
};
use crate::setup::engine::{HandshakeEngine, HandshakeEvent, KeyMaterial};
use crate::setup::nonce::DiversificationNonce;

/// Default allowed clock difference for ClientHello timestamps.
pub const DEFAULT_MAX_TIMESTAMP_SKEW_SECS: u64 = 60;

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn finished_data(transcript_hash: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(FINISHED_LABEL.len() + 32);
    data.extend_from_slice(FINISHED_LABEL);
    data.extend_from_slice(transcript_hash);
    data
}

fn unexpected(state: &str, message: &HandshakeMessage) -> CoreError {
    warn!(state, message = ?message.message_type(), "Unexpected handshake message");
    CoreError::refused(RejectReason::UnexpectedMessage)
}

// ============================================
// ClientHandshake
// ============================================

enum ClientState {
    Idle,
    AwaitingServerHello {
        initial: EphemeralKeyPair,
        forward: EphemeralKeyPair,
        client_hello: Vec<u8>,
    },
    Finished,
}

/// Client side of the default handshake.
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use kestrel_core::crypto::{ClientHandshake, IdentityKeyPair};
/// use kestrel_core::protocol::CURRENT_VERSION;
///
/// let engine = ClientHandshake::new(Arc::new(IdentityKeyPair::generate()), CURRENT_VERSION);
/// ```
pub struct ClientHandshake {
    identity: Arc<IdentityKeyPair>,
    version: Version,
    trusted_server: Option<IdentityPublicKey>,
    negotiated: Option<Version>,
    state: ClientState,
}

impl ClientHandshake {
    /// Creates a client engine offering `version`.
    #[must_use]
    pub fn new(identity: Arc<IdentityKeyPair>, version: Version) -> Self {
        Self {
            identity,
            version,
            trusted_server: None,
            negotiated: None,
            state: ClientState::Idle,
        }
    }

    /// Only accept a server presenting this identity.
    #[must_use]
    pub fn with_trusted_server(mut self, server: IdentityPublicKey) -> Self {
        self.trusted_server = Some(server);
        self
    }

    fn on_server_hello(
        &mut self,
        hello: &ServerHello,
        initial: EphemeralKeyPair,
        forward: EphemeralKeyPair,
        client_hello: &[u8],
    ) -> Result<Vec<HandshakeEvent>> {
        if hello.version != self.version.as_u32() {
            warn!(
                offered = %self.version,
                selected = %Version::new(hello.version),
                "Server selected a different version"
            );
            return Err(CoreError::refused(RejectReason::UnsupportedVersion));
        }

        let server_identity = IdentityPublicKey::from_bytes(&hello.server_public_key)?;
        if let Some(trusted) = &self.trusted_server {
            if trusted != &server_identity {
                warn!(server = %server_identity, "Untrusted server identity");
                return Err(CoreError::refused(RejectReason::UntrustedIdentity));
            }
        }

        let client_hello_hash = sha256(&[client_hello]);
        server_identity.verify(&hello.signed_bytes(&client_hello_hash), &hello.signature)?;
        debug!(server = %server_identity, "ServerHello signature verified");
        self.negotiated = Some(self.version);

        let secure_secret = initial.exchange(&hello.server_config_key)?;
        let forward_secret = forward.exchange(&hello.server_forward_key)?;

        let context = KeyContext {
            client_public: self.identity.public_key_bytes(),
            server_public: hello.server_public_key,
        };

        let server_hello = HandshakeMessage::ServerHello(hello.clone()).to_bytes();
        let transcript_hash = sha256(&[client_hello, &server_hello[..]]);
        let finished = ClientFinished {
            signature: self.identity.sign(&finished_data(&transcript_hash)),
        };

        Ok(vec![
            HandshakeEvent::InstallKeys(KeyMaterial {
                level: EncryptionLevel::Secure,
                secret: secure_secret,
                context,
                diversification_nonce: Some(DiversificationNonce::from_bytes(
                    hello.diversification_nonce,
                )),
            }),
            HandshakeEvent::InstallKeys(KeyMaterial {
                level: EncryptionLevel::ForwardSecure,
                secret: forward_secret,
                context,
                diversification_nonce: None,
            }),
            HandshakeEvent::Send(HandshakeMessage::ClientFinished(finished)),
            HandshakeEvent::Complete,
        ])
    }
}

impl HandshakeEngine for ClientHandshake {
    fn perspective(&self) -> Perspective {
        Perspective::Client
    }

    fn start(&mut self) -> Result<Vec<HandshakeEvent>> {
        if !matches!(self.state, ClientState::Idle) {
            return Err(CoreError::invalid_state("start handshake", "idle engine"));
        }

        let initial = EphemeralKeyPair::generate();
        let forward = EphemeralKeyPair::generate();
        let mut hello = ClientHello {
            version: self.version.as_u32(),
            client_public_key: self.identity.public_key_bytes(),
            client_initial_key: initial.public_key_bytes(),
            client_forward_key: forward.public_key_bytes(),
            timestamp: Timestamp::now().as_secs(),
            signature: [0u8; 64],
        };
        hello.signature = self.identity.sign(&hello.signed_bytes());

        let message = HandshakeMessage::ClientHello(hello);
        self.state = ClientState::AwaitingServerHello {
            initial,
            forward,
            client_hello: message.to_bytes().to_vec(),
        };
        debug!(version = %self.version, "Sending ClientHello");
        Ok(vec![HandshakeEvent::Send(message)])
    }

    fn on_message(&mut self, message: HandshakeMessage) -> Result<Vec<HandshakeEvent>> {
        match (std::mem::replace(&mut self.state, ClientState::Finished), message) {
            (
                ClientState::AwaitingServerHello {
                    initial,
                    forward,
                    client_hello,
                },
                HandshakeMessage::ServerHello(hello),
            ) => {
                let events = self.on_server_hello(&hello, initial, forward, &client_hello)?;
                info!("Client handshake complete");
                Ok(events)
            }
            (ClientState::Idle, message) => Err(unexpected("idle", &message)),
            (ClientState::AwaitingServerHello { .. }, message) => {
                Err(unexpected("awaiting ServerHello", &message))
            }
            (ClientState::Finished, message) => Err(unexpected("finished", &message)),
        }
    }

    fn negotiated_version(&self) -> Option<Version> {
        self.negotiated
    }
}

// ============================================
// ServerHandshake
// ============================================

enum ServerState {
    AwaitingClientHello,
    AwaitingFinished {
        client_identity: IdentityPublicKey,
        forward_secret: LevelSecret,
        context: KeyContext,
        transcript_hash: [u8; 32],
    },
    Finished,
}

/// Server side of the default handshake.
pub struct ServerHandshake {
    identity: Arc<IdentityKeyPair>,
    config_key: Arc<StaticKeyPair>,
    versions: SupportedVersions,
    max_timestamp_skew_secs: u64,
    negotiated: Option<Version>,
    state: ServerState,
}

impl ServerHandshake {
    /// Creates a server engine.
    ///
    /// The identity and configuration key are shared by every connection
    /// the endpoint accepts.
    #[must_use]
    pub fn new(
        identity: Arc<IdentityKeyPair>,
        config_key: Arc<StaticKeyPair>,
        versions: SupportedVersions,
    ) -> Self {
        Self {
            identity,
            config_key,
            versions,
            max_timestamp_skew_secs: DEFAULT_MAX_TIMESTAMP_SKEW_SECS,
            negotiated: None,
            state: ServerState::AwaitingClientHello,
        }
    }

    /// Sets the allowed clock difference for ClientHello timestamps.
    #[must_use]
    pub fn with_timestamp_skew(mut self, seconds: u64) -> Self {
        self.max_timestamp_skew_secs = seconds;
        self
    }

    fn on_client_hello(&mut self, hello: &ClientHello) -> Result<Vec<HandshakeEvent>> {
        let version = Version::new(hello.version);
        if !self.versions.contains(version) {
            warn!(%version, "Client requested unsupported version");
            return Err(CoreError::refused(RejectReason::UnsupportedVersion));
        }

        if !Timestamp::from_secs(hello.timestamp).is_recent(self.max_timestamp_skew_secs) {
            warn!(
                timestamp = hello.timestamp,
                max_skew = self.max_timestamp_skew_secs,
                "ClientHello timestamp outside allowed skew"
            );
            return Err(CoreError::refused(RejectReason::StaleTimestamp));
        }

        let client_identity = IdentityPublicKey::from_bytes(&hello.client_public_key)?;
        client_identity.verify(&hello.signed_bytes(), &hello.signature)?;
        debug!(client = %client_identity, "ClientHello signature verified");
        self.negotiated = Some(version);

        let nonce = DiversificationNonce::generate();
        let secure_secret = self.config_key.exchange(&hello.client_initial_key)?;
        let ephemeral = EphemeralKeyPair::generate();
        let server_forward_key = ephemeral.public_key_bytes();
        let forward_secret = ephemeral.exchange(&hello.client_forward_key)?;

        let client_hello = HandshakeMessage::ClientHello(hello.clone()).to_bytes();
        let mut server_hello = ServerHello {
            version: hello.version,
            server_public_key: self.identity.public_key_bytes(),
            server_config_key: self.config_key.public_key_bytes(),
            server_forward_key,
            diversification_nonce: *nonce.as_bytes(),
            signature: [0u8; 64],
        };
        server_hello.signature = self
            .identity
            .sign(&server_hello.signed_bytes(&sha256(&[&client_hello[..]])));
        let server_hello = HandshakeMessage::ServerHello(server_hello);

        let context = KeyContext {
            client_public: hello.client_public_key,
            server_public: self.identity.public_key_bytes(),
        };
        self.state = ServerState::AwaitingFinished {
            client_identity,
            forward_secret,
            context,
            transcript_hash: sha256(&[&client_hello[..], &server_hello.to_bytes()[..]]),
        };

        Ok(vec![
            HandshakeEvent::InstallKeys(KeyMaterial {
                level: EncryptionLevel::Secure,
                secret: secure_secret,
                context,
                diversification_nonce: Some(nonce),
            }),
            HandshakeEvent::Send(server_hello),
        ])
    }
}

impl HandshakeEngine for ServerHandshake {
    fn perspective(&self) -> Perspective {
        Perspective::Server
    }

    fn start(&mut self) -> Result<Vec<HandshakeEvent>> {
        Ok(Vec::new())
    }

    fn on_message(&mut self, message: HandshakeMessage) -> Result<Vec<HandshakeEvent>> {
        match (std::mem::replace(&mut self.state, ServerState::Finished), message) {
            (ServerState::AwaitingClientHello, HandshakeMessage::ClientHello(hello)) => {
                self.on_client_hello(&hello)
            }
            (
                ServerState::AwaitingFinished {
                    client_identity,
                    forward_secret,
                    context,
                    transcript_hash,
                },
                HandshakeMessage::ClientFinished(finished),
            ) => {
                client_identity.verify(&finished_data(&transcript_hash), &finished.signature)?;
                info!(client = %client_identity, "Server handshake complete");
                Ok(vec![
                    HandshakeEvent::InstallKeys(KeyMaterial {
                        level: EncryptionLevel::ForwardSecure,
                        secret: forward_secret,
                        context,
                        diversification_nonce: None,
                    }),
                    HandshakeEvent::Complete,
                ])
            }
            (ServerState::AwaitingClientHello, message) => {
                Err(unexpected("awaiting ClientHello", &message))
            }
            (ServerState::AwaitingFinished { .. }, message) => {
                Err(unexpected("awaiting ClientFinished", &message))
            }
            (ServerState::Finished, message) => Err(unexpected("finished", &message)),
        }
    }

    fn negotiated_version(&self) -> Option<Version> {
        self.negotiated
    }
}

// ============================================
// Tests
// ============================================

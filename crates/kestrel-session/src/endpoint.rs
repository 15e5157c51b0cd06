// ============================================
// File: crates/kestrel-session/src/endpoint.rs
// ============================================
//! # Endpoint
//!
//! ## Creation Reason
//! Everything the connections of one process share: configuration, the
//! long-term identity, the server configuration key and the registry.
//!
//! ## Main Functionality
//! - `Endpoint::connect`: new client session, registered
//! - `Endpoint::accept`: new server session for a client's connection id
//! - `Endpoint::spawn_idle_reaper`: background cleanup task
//! - `Endpoint::shutdown`: close every connection
//!
//! ## Lifecycle
//! ```text
//! EndpointConfig ──► Endpoint::new ──► connect / accept ──► Session
//!                                            │
//!                                            ▼
//!                                   ConnectionRegistry ◄── idle reaper
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The identity and config key are shared by every connection via `Arc`
//! - Sessions are registered before their handshake runs
//!
//! ## Last Modified
//! v0.1.0 - Initial endpoint

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use kestrel_common::{ConnectionId, Perspective};
use kestrel_core::crypto::IdentityPublicKey;
use kestrel_core::{ClientHandshake, IdentityKeyPair, ServerHandshake, StaticKeyPair, Version};

use crate::config::EndpointConfig;
use crate::connection::Connection;
use crate::error::{Result, SessionError};
use crate::registry::ConnectionRegistry;
use crate::session::{ClientSession, ServerSession};

/// Shared state of all connections in one process.
pub struct Endpoint {
    config: EndpointConfig,
    identity: Arc<IdentityKeyPair>,
    config_key: Arc<StaticKeyPair>,
    registry: Arc<ConnectionRegistry>,
}

impl Endpoint {
    /// Creates an endpoint from validated configuration and keys.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if the configuration does not validate.
    pub fn new(
        config: EndpointConfig,
        identity: IdentityKeyPair,
        config_key: StaticKeyPair,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ConnectionRegistry::new(
            config.limits.max_connections,
            config.idle_timeout(),
        ));

        info!(
            identity = %identity.public_key(),
            versions = ?config.supported_versions(),
            max_connections = config.limits.max_connections,
            "Endpoint created"
        );

        Ok(Self {
            config,
            identity: Arc::new(identity),
            config_key: Arc::new(config_key),
            registry,
        })
    }

    /// Creates an endpoint with freshly generated keys.
    ///
    /// # Errors
    /// See [`Endpoint::new`].
    pub fn generate(config: EndpointConfig) -> Result<Self> {
        Self::new(config, IdentityKeyPair::generate(), StaticKeyPair::generate())
    }

    #[must_use]
    pub const fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Identity presented to peers.
    #[must_use]
    pub fn identity_public_key(&self) -> IdentityPublicKey {
        self.identity.public_key()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn register(&self, id: ConnectionId, perspective: Perspective) -> Result<Arc<Connection>> {
        let connection = Arc::new(Connection::new(
            id,
            perspective,
            self.config.crypto_setup_config(),
        ));
        self.registry.insert(connection)
    }

    // ========================================
    // Sessions
    // ========================================

    /// Opens a client session offering the preferred version.
    ///
    /// With `server_identity` set, any other server is refused.
    ///
    /// # Errors
    /// `ConnectionLimitReached` when the registry is full.
    pub fn connect(&self, server_identity: Option<IdentityPublicKey>) -> Result<ClientSession> {
        self.connect_with_version(self.config.supported_versions().preferred(), server_identity)
    }

    /// Opens a client session offering `version`.
    ///
    /// # Errors
    /// - `UnsupportedVersion` if this endpoint does not speak `version`
    /// - `ConnectionLimitReached` when the registry is full
    pub fn connect_with_version(
        &self,
        version: Version,
        server_identity: Option<IdentityPublicKey>,
    ) -> Result<ClientSession> {
        if !self.config.supported_versions().contains(version) {
            return Err(SessionError::UnsupportedVersion(version));
        }

        let connection = self.register(ConnectionId::generate(), Perspective::Client)?;
        debug!(connection_id = %connection.id(), %version, "Client session created");

        Ok(ClientSession::new(
            connection,
            ClientHandshake::new(Arc::clone(&self.identity), version),
            server_identity,
            self.config.handshake_timeout(),
        ))
    }

    /// Accepts a connection the client opened under `connection_id`.
    ///
    /// # Errors
    /// - `ConnectionExists` if the id is already registered
    /// - `ConnectionLimitReached` when the registry is full
    pub fn accept(&self, connection_id: ConnectionId) -> Result<ServerSession> {
        let connection = self.register(connection_id, Perspective::Server)?;
        debug!(connection_id = %connection_id, "Server session created");

        let engine = ServerHandshake::new(
            Arc::clone(&self.identity),
            Arc::clone(&self.config_key),
            self.config.supported_versions().clone(),
        )
        .with_timestamp_skew(self.config.handshake.max_timestamp_skew_secs);

        Ok(ServerSession::new(
            connection,
            engine,
            self.config.handshake_timeout(),
        ))
    }

    /// Closes and forgets a connection.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.registry.remove(id)
    }

    // ========================================
    // Background Tasks
    // ========================================

    /// Spawns the idle connection cleanup task.
    ///
    /// Runs every `interval` until `shutdown` fires.
    pub fn spawn_idle_reaper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("Idle reaper received shutdown signal");
                        break;
                    }
                    _ = interval_timer.tick() => {
                        registry.cleanup_idle();
                    }
                }
            }
        })
    }

    /// Closes every connection. Returns how many were open.
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.close_all();
        info!(connections = closed, "Endpoint shut down");
        closed
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("identity", &self.identity_public_key())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use kestrel_core::{EncryptionLevel, SupportedVersions};
    use kestrel_transport::MemoryCryptoStream;

    use super::*;
    use crate::session::Session;

    fn endpoint() -> Endpoint {
        Endpoint::generate(EndpointConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_connect_accept_exchange() {
        let server = endpoint();
        let client = endpoint();

        let client_session = client.connect(Some(server.identity_public_key())).unwrap();
        let server_session = server.accept(client_session.id()).unwrap();
        assert_eq!(client.registry().count(), 1);
        assert_eq!(server.registry().count(), 1);

        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();
        let (c, s) = tokio::join!(
            client_session.handshake(&mut client_stream),
            server_session.handshake(&mut server_stream),
        );
        c.unwrap();
        s.unwrap();

        let packet = client_session
            .seal(b"over the endpoint", EncryptionLevel::Unspecified)
            .unwrap();
        let registered = server.registry().get(&client_session.id()).unwrap();
        let opened = registered.open_packet(&packet.bytes).unwrap();
        assert_eq!(opened.payload, b"over the endpoint");
    }

    #[tokio::test]
    async fn test_version_mismatch_fails_handshake() {
        let mut server_config = EndpointConfig::default();
        server_config.versions.supported = SupportedVersions::new(vec![Version::new(2)]).unwrap();
        let server = Endpoint::generate(server_config).unwrap();
        let client = endpoint();

        let client_session = client.connect(None).unwrap();
        let server_session = server.accept(client_session.id()).unwrap();
        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();
        let (c, s) = tokio::join!(
            client_session.handshake(&mut client_stream),
            server_session.handshake(&mut server_stream),
        );
        assert!(c.is_err());
        assert!(s.is_err());
        assert_eq!(client_session.encryption_level(), EncryptionLevel::Unencrypted);
    }

    #[test]
    fn test_unsupported_version_refused_locally() {
        let client = endpoint();
        assert!(matches!(
            client.connect_with_version(Version::new(99), None),
            Err(SessionError::UnsupportedVersion(_))
        ));
        assert!(client.registry().is_empty());
    }

    #[test]
    fn test_connection_limit() {
        let mut config = EndpointConfig::default();
        config.limits.max_connections = 1;
        let server = Endpoint::generate(config).unwrap();

        server.accept(ConnectionId::generate()).unwrap();
        assert!(matches!(
            server.accept(ConnectionId::generate()),
            Err(SessionError::ConnectionLimitReached { limit: 1 })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EndpointConfig::default();
        config.limits.max_connections = 0;
        assert!(Endpoint::generate(config).unwrap_err().is_config_error());
    }

    #[tokio::test]
    async fn test_idle_reaper_and_shutdown() {
        let mut config = EndpointConfig::default();
        config.limits.idle_timeout_secs = 1;
        let server = Endpoint::generate(config).unwrap();

        let session = server.accept(ConnectionId::generate()).unwrap();
        session.close();
        let kept = server.accept(ConnectionId::generate()).unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let reaper = server.spawn_idle_reaper(Duration::from_millis(10), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(server.registry().get(&session.id()).is_none());
        assert!(server.registry().get(&kept.id()).is_some());

        shutdown_tx.send(()).unwrap();
        reaper.await.unwrap();

        assert_eq!(server.shutdown(), 1);
        assert!(kept.connection().is_closed());
    }
}

// ============================================
// File: crates/kestrel-session/src/session.rs
// ============================================
//! # Client and Server Sessions
//!
//! ## Creation Reason
//! A connection plus the handshake engine for one side. The session owns
//! the engine until the handshake runs, so each session handshakes once.
//!
//! ## Main Functionality
//! - `Session`: common trait, object safe
//! - `ClientSession`: drives `ClientHandshake`
//! - `ServerSession`: drives `ServerHandshake`
//!
//! ## ⚠️ Important Note for Next Developer
//! - The engine lock is never held across an await
//! - A second `handshake` call fails with `InvalidState`
//!
//! ## Last Modified
//! v0.1.0 - Initial sessions

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use kestrel_common::{ConnectionId, Perspective};
use kestrel_core::crypto::IdentityPublicKey;
use kestrel_core::{ClientHandshake, CoreError, EncryptionLevel, HandshakeEngine, ServerHandshake};
use kestrel_transport::CryptoStream;

use crate::connection::{Connection, ConnectionEvent};
use crate::error::Result;
use crate::packet::{IncomingPacket, OutgoingPacket};

/// One side of a connection.
#[async_trait]
pub trait Session: Send + Sync {
    /// The underlying connection.
    fn connection(&self) -> &Arc<Connection>;

    /// Runs the handshake on `stream`.
    ///
    /// # Errors
    /// See [`Connection::run_handshake`]. Calling it twice is an
    /// `InvalidState` error.
    async fn handshake(&self, stream: &mut dyn CryptoStream) -> Result<()>;

    /// Connection id.
    fn id(&self) -> ConnectionId {
        self.connection().id()
    }

    /// Which side this session plays.
    fn perspective(&self) -> Perspective {
        self.connection().perspective()
    }

    /// Current sealing level.
    fn encryption_level(&self) -> EncryptionLevel {
        self.connection().encryption_level()
    }

    /// Subscribes to connection state events.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection().subscribe()
    }

    /// Seals an outgoing packet.
    ///
    /// # Errors
    /// See [`Connection::seal_packet`].
    fn seal(&self, payload: &[u8], forced_level: EncryptionLevel) -> Result<OutgoingPacket> {
        self.connection().seal_packet(payload, forced_level)
    }

    /// Opens an incoming packet.
    ///
    /// # Errors
    /// See [`Connection::open_packet`].
    fn open(&self, packet: &[u8]) -> Result<IncomingPacket> {
        self.connection().open_packet(packet)
    }

    /// Closes the connection.
    fn close(&self) -> bool {
        self.connection().close()
    }
}

async fn run_once<E>(
    connection: &Connection,
    engine: &Mutex<Option<E>>,
    stream: &mut dyn CryptoStream,
    timeout: Duration,
) -> Result<()>
where
    E: HandshakeEngine,
{
    let taken = engine.lock().take();
    let Some(mut engine) = taken else {
        return Err(
            CoreError::invalid_state("start session handshake", "handshake not yet run").into(),
        );
    };
    debug!(
        connection_id = %connection.id(),
        perspective = %connection.perspective(),
        "Session handshake starting"
    );
    connection.run_handshake(stream, &mut engine, timeout).await
}

// ============================================
// ClientSession
// ============================================

/// Client side of a connection.
pub struct ClientSession {
    connection: Arc<Connection>,
    engine: Mutex<Option<ClientHandshake>>,
    server_identity: Option<IdentityPublicKey>,
    timeout: Duration,
}

impl ClientSession {
    /// Pairs a client connection with its engine.
    #[must_use]
    pub fn new(
        connection: Arc<Connection>,
        engine: ClientHandshake,
        server_identity: Option<IdentityPublicKey>,
        timeout: Duration,
    ) -> Self {
        let engine = match server_identity {
            Some(server) => engine.with_trusted_server(server),
            None => engine,
        };
        Self {
            connection,
            engine: Mutex::new(Some(engine)),
            server_identity,
            timeout,
        }
    }

    /// Server identity this session insists on, if any.
    #[must_use]
    pub const fn server_identity(&self) -> Option<&IdentityPublicKey> {
        self.server_identity.as_ref()
    }
}

#[async_trait]
impl Session for ClientSession {
    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    async fn handshake(&self, stream: &mut dyn CryptoStream) -> Result<()> {
        run_once(&self.connection, &self.engine, stream, self.timeout).await
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("connection", &self.connection)
            .field("server_identity", &self.server_identity)
            .finish_non_exhaustive()
    }
}

// ============================================
// ServerSession
// ============================================

/// Server side of a connection.
pub struct ServerSession {
    connection: Arc<Connection>,
    engine: Mutex<Option<ServerHandshake>>,
    timeout: Duration,
}

impl ServerSession {
    /// Pairs a server connection with its engine.
    #[must_use]
    pub fn new(connection: Arc<Connection>, engine: ServerHandshake, timeout: Duration) -> Self {
        Self {
            connection,
            engine: Mutex::new(Some(engine)),
            timeout,
        }
    }
}

#[async_trait]
impl Session for ServerSession {
    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    async fn handshake(&self, stream: &mut dyn CryptoStream) -> Result<()> {
        run_once(&self.connection, &self.engine, stream, self.timeout).await
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

// ============================================
// File: crates/kestrel-session/src/connection.rs
// ============================================
//! # Connection
//!
//! ## Creation Reason
//! Wraps one connection's `CryptoSetup` with the packet-level concerns
//! around it: header framing, packet number allocation, duplicate
//! detection, state events, handshake timeout and teardown.
//!
//! ## Main Functionality
//! - `Connection::seal_packet`: header + protected payload
//! - `Connection::open_packet`: header parse, duplicate check, open, record
//! - `Connection::run_handshake`: crypto stream handler under a deadline
//! - `ConnectionEvent`: broadcast as encryption levels come into use
//!
//! ## Event Order
//! ```text
//! EncryptedOutgoing ──► ForwardSecureOutgoing      our sealing level
//! EncryptedIncoming ──► ForwardSecureIncoming      first packet opened at level
//! VersionNegotiated                                once the engine reports it
//! ```
//! Each event fires at most once per connection.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Packet numbers are recorded as received only after authentication
//! - `close` cancels a running handshake through the shutdown channel
//! - Events use a broadcast channel; slow subscribers may lag
//!
//! ## Last Modified
//! v0.1.0 - Initial connection implementation

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use kestrel_common::time::AtomicInstant;
use kestrel_common::{ConnectionId, PacketNumber, Perspective};
use kestrel_core::{CryptoSetup, CryptoSetupConfig, EncryptionLevel, HandshakeEngine, Version};
use kestrel_transport::CryptoStream;

use crate::error::{Result, SessionError};
use crate::packet::{IncomingPacket, OutgoingPacket, PacketHeader};
use crate::replay::{PacketNumberWindow, WindowCheck};

/// Capacity of the event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// First packet number a connection sends.
const INITIAL_PACKET_NUMBER: u64 = 1;

// ============================================
// ConnectionEvent
// ============================================

/// Connection state changes, in the order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Both sides settled on a protocol version.
    VersionNegotiated(Version),
    /// A packet from the peer opened at `Secure`.
    EncryptedIncoming,
    /// We can seal at `Secure`.
    EncryptedOutgoing,
    /// A packet from the peer opened at `ForwardSecure`.
    ForwardSecureIncoming,
    /// We can seal at `ForwardSecure`.
    ForwardSecureOutgoing,
}

impl ConnectionEvent {
    const fn outgoing(level: EncryptionLevel) -> Option<Self> {
        match level {
            EncryptionLevel::Secure => Some(Self::EncryptedOutgoing),
            EncryptionLevel::ForwardSecure => Some(Self::ForwardSecureOutgoing),
            _ => None,
        }
    }

    const fn incoming(level: EncryptionLevel) -> Option<Self> {
        match level {
            EncryptionLevel::Secure => Some(Self::EncryptedIncoming),
            EncryptionLevel::ForwardSecure => Some(Self::ForwardSecureIncoming),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionNegotiated(v) => write!(f, "version negotiated ({v})"),
            Self::EncryptedIncoming => write!(f, "encrypted incoming"),
            Self::EncryptedOutgoing => write!(f, "encrypted outgoing"),
            Self::ForwardSecureIncoming => write!(f, "forward secure incoming"),
            Self::ForwardSecureOutgoing => write!(f, "forward secure outgoing"),
        }
    }
}

// ============================================
// Connection
// ============================================

/// One end of a protected connection.
pub struct Connection {
    id: ConnectionId,
    crypto: Arc<CryptoSetup>,
    version: OnceLock<Version>,
    next_packet_number: AtomicU64,
    received: Mutex<PacketNumberWindow>,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown: broadcast::Sender<()>,
    closed: AtomicBool,
    reported_outgoing: AtomicU8,
    reported_incoming: AtomicU8,
    created_at: Instant,
    last_activity: AtomicInstant,
}

impl Connection {
    /// Creates a connection at `Unencrypted`.
    #[must_use]
    pub fn new(id: ConnectionId, perspective: Perspective, config: CryptoSetupConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, _) = broadcast::channel(1);
        let unencrypted = EncryptionLevel::Unencrypted.as_u8();

        Self {
            id,
            crypto: Arc::new(CryptoSetup::new(id, perspective, config)),
            version: OnceLock::new(),
            next_packet_number: AtomicU64::new(INITIAL_PACKET_NUMBER),
            received: Mutex::new(PacketNumberWindow::new()),
            events,
            shutdown,
            closed: AtomicBool::new(false),
            reported_outgoing: AtomicU8::new(unencrypted),
            reported_incoming: AtomicU8::new(unencrypted),
            created_at: Instant::now(),
            last_activity: AtomicInstant::now(),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn perspective(&self) -> Perspective {
        self.crypto.perspective()
    }

    /// The crypto setup protecting this connection's packets.
    #[must_use]
    pub fn crypto(&self) -> &Arc<CryptoSetup> {
        &self.crypto
    }

    /// Negotiated version, once the handshake got that far.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.version.get().copied()
    }

    #[must_use]
    pub fn encryption_level(&self) -> EncryptionLevel {
        self.crypto.encryption_level()
    }

    #[must_use]
    pub fn handshake_complete(&self) -> bool {
        self.crypto.handshake_complete()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Subscribes to state events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since a packet was last sealed or opened.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    #[must_use]
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.has_elapsed(timeout)
    }

    // ========================================
    // Handshake
    // ========================================

    /// Runs the handshake on `stream` until it completes, fails, times out
    /// or the connection is closed.
    ///
    /// # Errors
    /// - `Closed` if the connection was already closed
    /// - `HandshakeTimeout` if `timeout` elapsed first
    /// - `Core(HandshakeCancelled)` if `close` was called meanwhile
    /// - `Core(HandshakeFailure)` for protocol and peer failures
    pub async fn run_handshake<S, E>(
        &self,
        stream: &mut S,
        engine: &mut E,
        timeout: Duration,
    ) -> Result<()>
    where
        S: CryptoStream + ?Sized,
        E: HandshakeEngine + ?Sized,
    {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let mut levels = self.crypto.subscribe_levels();
        let shutdown = self.shutdown.subscribe();

        let outcome = tokio::time::timeout(timeout, async {
            let handshake = self
                .crypto
                .handle_crypto_stream(&mut *stream, &mut *engine, shutdown);
            tokio::pin!(handshake);
            loop {
                tokio::select! {
                    result = &mut handshake => break result,
                    changed = levels.changed() => {
                        if changed.is_err() {
                            break (&mut handshake).await;
                        }
                        let level = *levels.borrow_and_update();
                        self.report_outgoing(level);
                    }
                }
            }
        })
        .await;

        self.report_outgoing(self.crypto.encryption_level());
        if let Some(version) = engine.negotiated_version() {
            self.set_version(version);
        }

        match outcome {
            Ok(Ok(())) => {
                self.last_activity.touch();
                info!(
                    connection_id = %self.id,
                    perspective = %self.perspective(),
                    elapsed_ms = self.age().as_millis(),
                    "Connection established"
                );
                Ok(())
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                warn!(
                    connection_id = %self.id,
                    level = %self.encryption_level(),
                    timeout_ms = timeout.as_millis(),
                    "Handshake timed out"
                );
                Err(SessionError::HandshakeTimeout(timeout))
            }
        }
    }

    fn set_version(&self, version: Version) {
        if self.version.set(version).is_ok() {
            debug!(connection_id = %self.id, %version, "Version negotiated");
            self.emit(ConnectionEvent::VersionNegotiated(version));
        }
    }

    // ========================================
    // Packets
    // ========================================

    fn allocate_packet_number(&self) -> Result<PacketNumber> {
        self.next_packet_number
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map(PacketNumber::new)
            .map_err(|_| SessionError::PacketNumberExhausted)
    }

    /// Seals `payload` under a fresh packet number.
    ///
    /// `forced_level` of `Unspecified` seals at the current level.
    ///
    /// # Errors
    /// - `Closed` after `close`
    /// - `Core(LevelNotAvailable)` if the forced level is not installed
    pub fn seal_packet(
        &self,
        payload: &[u8],
        forced_level: EncryptionLevel,
    ) -> Result<OutgoingPacket> {
        self.ensure_open()?;
        let packet_number = self.allocate_packet_number()?;

        let guard = self.crypto.lock_for_sealing();
        let level = guard.resolve_level(forced_level)?;
        let diversification_nonce = match (self.perspective(), level) {
            (Perspective::Server, EncryptionLevel::Secure) => {
                self.crypto.diversification_nonce().copied()
            }
            _ => None,
        };
        let header = PacketHeader {
            connection_id: self.id,
            packet_number,
            diversification_nonce,
        }
        .encode();

        let mut bytes = header.clone();
        guard.seal_into(&mut bytes, payload, packet_number, &header, level)?;
        guard.unlock();

        self.last_activity.touch();
        trace!(
            connection_id = %self.id,
            packet_number = %packet_number,
            %level,
            len = bytes.len(),
            "Packet sealed"
        );
        Ok(OutgoingPacket {
            packet_number,
            level,
            bytes,
        })
    }

    /// Authenticates and decrypts a received packet.
    ///
    /// # Errors
    /// - `InvalidHeader` for malformed headers, a foreign connection id or
    ///   a nonce that does not match the recorded one
    /// - `DuplicatePacket` / `PacketTooOld` for numbers already seen
    /// - `Core(Decryption)` if no permitted level authenticates it
    pub fn open_packet(&self, packet: &[u8]) -> Result<IncomingPacket> {
        self.ensure_open()?;

        let (header, header_len) = PacketHeader::decode(packet)?;
        if header.connection_id != self.id {
            return Err(SessionError::invalid_header(format!(
                "connection id {} on connection {}",
                header.connection_id, self.id
            )));
        }
        self.check_nonce(&header)?;

        let packet_number = header.packet_number;
        Self::window_verdict(self.received.lock().check(packet_number.value()), packet_number)?;

        let (associated_data, ciphertext) = packet.split_at(header_len);
        let (payload, level) = self
            .crypto
            .open(ciphertext, packet_number, associated_data)?;

        // A concurrent open of the same number may have won the race.
        Self::window_verdict(self.received.lock().record(packet_number.value()), packet_number)?;

        self.report_incoming(level);
        self.last_activity.touch();
        trace!(
            connection_id = %self.id,
            packet_number = %packet_number,
            %level,
            "Packet accepted"
        );
        Ok(IncomingPacket {
            packet_number,
            level,
            payload,
        })
    }

    fn window_verdict(verdict: WindowCheck, packet_number: PacketNumber) -> Result<()> {
        match verdict {
            WindowCheck::Fresh => Ok(()),
            WindowCheck::Duplicate => Err(SessionError::DuplicatePacket(packet_number)),
            WindowCheck::TooOld => Err(SessionError::PacketTooOld(packet_number)),
        }
    }

    fn check_nonce(&self, header: &PacketHeader) -> Result<()> {
        let Some(nonce) = &header.diversification_nonce else {
            return Ok(());
        };
        if self.perspective() == Perspective::Server {
            return Err(SessionError::invalid_header(
                "diversification nonce on a client packet",
            ));
        }
        match self.crypto.diversification_nonce() {
            Some(recorded) if recorded != nonce => Err(SessionError::invalid_header(
                "diversification nonce differs from the handshake",
            )),
            _ => Ok(()),
        }
    }

    // ========================================
    // Events
    // ========================================

    fn emit(&self, event: ConnectionEvent) {
        debug!(connection_id = %self.id, %event, "Connection event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn report_outgoing(&self, level: EncryptionLevel) {
        let previous = self
            .reported_outgoing
            .fetch_max(level.as_u8(), Ordering::AcqRel);
        self.emit_crossed(previous, level, ConnectionEvent::outgoing);
    }

    fn report_incoming(&self, level: EncryptionLevel) {
        let previous = self
            .reported_incoming
            .fetch_max(level.as_u8(), Ordering::AcqRel);
        self.emit_crossed(previous, level, ConnectionEvent::incoming);
    }

    fn emit_crossed(
        &self,
        previous: u8,
        level: EncryptionLevel,
        event_for: fn(EncryptionLevel) -> Option<ConnectionEvent>,
    ) {
        for crossed in EncryptionLevel::INSTALLABLE {
            if crossed.as_u8() > previous && crossed <= level {
                if let Some(event) = event_for(crossed) {
                    self.emit(event);
                }
            }
        }
    }

    // ========================================
    // Lifecycle
    // ========================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Closes the connection and cancels a running handshake.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // No running handshake is fine.
        let _ = self.shutdown.send(());
        info!(
            connection_id = %self.id,
            level = %self.encryption_level(),
            age_ms = self.age().as_millis(),
            "Connection closed"
        );
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("perspective", &self.perspective())
            .field("level", &self.encryption_level())
            .field("version", &self.version())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use kestrel_core::{
        ClientHandshake, IdentityKeyPair, ServerHandshake, StaticKeyPair, SupportedVersions,
    };
    use kestrel_transport::MemoryCryptoStream;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn pair() -> (Connection, Connection) {
        let id = ConnectionId::generate();
        (
            Connection::new(id, Perspective::Client, CryptoSetupConfig::default()),
            Connection::new(id, Perspective::Server, CryptoSetupConfig::default()),
        )
    }

    fn engines() -> (ClientHandshake, ServerHandshake) {
        let client = ClientHandshake::new(Arc::new(IdentityKeyPair::generate()), Version::default());
        let server = ServerHandshake::new(
            Arc::new(IdentityKeyPair::generate()),
            Arc::new(StaticKeyPair::generate()),
            SupportedVersions::default(),
        );
        (client, server)
    }

    async fn established() -> (Connection, Connection) {
        let (client, server) = pair();
        let (mut client_engine, mut server_engine) = engines();
        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();

        let (c, s) = tokio::join!(
            client.run_handshake(&mut client_stream, &mut client_engine, TIMEOUT),
            server.run_handshake(&mut server_stream, &mut server_engine, TIMEOUT),
        );
        c.unwrap();
        s.unwrap();
        (client, server)
    }

    fn drain(rx: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_unencrypted_exchange() {
        let (client, server) = pair();
        let sent = client.seal_packet(b"hello", EncryptionLevel::Unspecified).unwrap();
        assert_eq!(sent.level, EncryptionLevel::Unencrypted);
        assert_eq!(sent.packet_number, PacketNumber::new(INITIAL_PACKET_NUMBER));

        let received = server.open_packet(&sent.bytes).unwrap();
        assert_eq!(received.payload, b"hello");
        assert_eq!(received.level, EncryptionLevel::Unencrypted);
    }

    #[test]
    fn test_packet_numbers_increase() {
        let (client, _) = pair();
        let a = client.seal_packet(b"a", EncryptionLevel::Unspecified).unwrap();
        let b = client.seal_packet(b"b", EncryptionLevel::Unspecified).unwrap();
        assert!(b.packet_number > a.packet_number);
    }

    #[test]
    fn test_duplicate_rejected_after_success_only() {
        let (client, server) = pair();
        let sent = client.seal_packet(b"once", EncryptionLevel::Unspecified).unwrap();

        // A forged copy under the same number must not burn it.
        let mut forged = sent.bytes.clone();
        let last = forged.len() - 1;
        forged[last] ^= 0x01;
        assert!(server.open_packet(&forged).unwrap_err().is_packet_error());

        server.open_packet(&sent.bytes).unwrap();
        assert!(matches!(
            server.open_packet(&sent.bytes),
            Err(SessionError::DuplicatePacket(_))
        ));
    }

    #[test]
    fn test_header_is_authenticated() {
        let (client, server) = pair();
        let sent = client.seal_packet(b"payload", EncryptionLevel::Unspecified).unwrap();

        let mut tampered = sent.bytes;
        tampered[10] ^= 0xff; // inside the packet number
        assert!(matches!(
            server.open_packet(&tampered),
            Err(SessionError::Core(kestrel_core::CoreError::Decryption))
        ));
    }

    #[test]
    fn test_foreign_connection_id_rejected() {
        let (client, _) = pair();
        let other = Connection::new(
            ConnectionId::generate(),
            Perspective::Server,
            CryptoSetupConfig::default(),
        );
        let sent = client.seal_packet(b"x", EncryptionLevel::Unspecified).unwrap();
        assert!(matches!(
            other.open_packet(&sent.bytes),
            Err(SessionError::InvalidHeader { .. })
        ));
    }

    #[tokio::test]
    async fn test_handshake_emits_events_and_protects() {
        let (client, server) = pair();
        let mut client_events = client.subscribe();
        let mut server_events = server.subscribe();
        let (mut client_engine, mut server_engine) = engines();
        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();

        let (c, s) = tokio::join!(
            client.run_handshake(&mut client_stream, &mut client_engine, TIMEOUT),
            server.run_handshake(&mut server_stream, &mut server_engine, TIMEOUT),
        );
        c.unwrap();
        s.unwrap();

        for events in [drain(&mut client_events), drain(&mut server_events)] {
            assert!(events.contains(&ConnectionEvent::EncryptedOutgoing));
            assert!(events.contains(&ConnectionEvent::ForwardSecureOutgoing));
            assert!(events.contains(&ConnectionEvent::VersionNegotiated(Version::default())));
            let secure = events.iter().position(|e| *e == ConnectionEvent::EncryptedOutgoing);
            let forward = events.iter().position(|e| *e == ConnectionEvent::ForwardSecureOutgoing);
            assert!(secure < forward);
        }
        assert_eq!(client.version(), Some(Version::default()));

        let sent = client.seal_packet(b"secret", EncryptionLevel::Unspecified).unwrap();
        assert_eq!(sent.level, EncryptionLevel::ForwardSecure);
        let received = server.open_packet(&sent.bytes).unwrap();
        assert_eq!(received.payload, b"secret");

        assert_eq!(
            drain(&mut server_events),
            vec![
                ConnectionEvent::EncryptedIncoming,
                ConnectionEvent::ForwardSecureIncoming
            ]
        );

        // Reported once only.
        let again = client.seal_packet(b"more", EncryptionLevel::Unspecified).unwrap();
        server.open_packet(&again.bytes).unwrap();
        assert!(drain(&mut server_events).is_empty());
    }

    #[tokio::test]
    async fn test_failed_handshake_negotiates_no_version() {
        let (client, server) = pair();
        let mut client_events = client.subscribe();
        let (client_engine, mut server_engine) = engines();
        let mut client_engine =
            client_engine.with_trusted_server(IdentityKeyPair::generate().public_key());
        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();

        let (c, s) = tokio::join!(
            client.run_handshake(&mut client_stream, &mut client_engine, TIMEOUT),
            server.run_handshake(&mut server_stream, &mut server_engine, TIMEOUT),
        );
        assert!(c.is_err());
        assert!(s.is_err());

        assert_eq!(client.version(), None);
        assert!(!drain(&mut client_events)
            .iter()
            .any(|e| matches!(e, ConnectionEvent::VersionNegotiated(_))));
    }

    #[tokio::test]
    async fn test_server_secure_packets_carry_nonce() {
        let (client, server) = established().await;

        let sent = server.seal_packet(b"early", EncryptionLevel::Secure).unwrap();
        let (header, _) = PacketHeader::decode(&sent.bytes).unwrap();
        assert_eq!(
            header.diversification_nonce.as_ref(),
            server.crypto().diversification_nonce()
        );

        let received = client.open_packet(&sent.bytes).unwrap();
        assert_eq!(received.level, EncryptionLevel::Secure);

        let forward = server.seal_packet(b"late", EncryptionLevel::Unspecified).unwrap();
        let (header, _) = PacketHeader::decode(&forward.bytes).unwrap();
        assert!(header.diversification_nonce.is_none());

        let from_client = client.seal_packet(b"up", EncryptionLevel::Secure).unwrap();
        let (header, _) = PacketHeader::decode(&from_client.bytes).unwrap();
        assert!(header.diversification_nonce.is_none());
    }

    #[tokio::test]
    async fn test_keyless_packet_after_handshake_burns_nothing() {
        use kestrel_core::crypto::{NullProtection, PacketProtection};

        let (client, server) = established().await;
        let packet_number = PacketNumber::new(INITIAL_PACKET_NUMBER);
        let header = PacketHeader {
            connection_id: server.id(),
            packet_number,
            diversification_nonce: None,
        }
        .encode();
        let mut forged = header.clone();
        NullProtection::new(Perspective::Client)
            .seal_into(&mut forged, b"injected", packet_number, &header)
            .unwrap();

        assert!(matches!(
            server.open_packet(&forged),
            Err(SessionError::Core(kestrel_core::CoreError::Decryption))
        ));

        let sent = client.seal_packet(b"genuine", EncryptionLevel::Unspecified).unwrap();
        assert_eq!(sent.packet_number, packet_number);
        let received = server.open_packet(&sent.bytes).unwrap();
        assert_eq!(received.payload, b"genuine");
        assert_eq!(received.level, EncryptionLevel::ForwardSecure);
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (client, _server) = pair();
        let (mut client_engine, _) = engines();
        // The server side never answers.
        let (mut client_stream, _server_stream) = MemoryCryptoStream::pair();

        let err = client
            .run_handshake(&mut client_stream, &mut client_engine, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::HandshakeTimeout(_)));
        assert!(err.is_fatal());
        assert!(!client.handshake_complete());
    }

    #[tokio::test]
    async fn test_close_cancels_handshake() {
        let (client, _server) = pair();
        let (mut client_engine, _) = engines();
        let (mut client_stream, _server_stream) = MemoryCryptoStream::pair();

        let closer = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(client.close());
        };
        let (result, ()) = tokio::join!(
            client.run_handshake(&mut client_stream, &mut client_engine, TIMEOUT),
            closer,
        );
        assert!(matches!(
            result,
            Err(SessionError::Core(kestrel_core::CoreError::HandshakeCancelled))
        ));

        assert!(!client.close());
        assert!(matches!(
            client.seal_packet(b"x", EncryptionLevel::Unspecified),
            Err(SessionError::Closed)
        ));
        assert!(matches!(
            client
                .run_handshake(&mut client_stream, &mut client_engine, TIMEOUT)
                .await,
            Err(SessionError::Closed)
        ));
    }

    #[test]
    fn test_idle_tracking() {
        let (client, _) = pair();
        assert!(!client.is_idle(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(client.is_idle(Duration::from_millis(1)));

        client.seal_packet(b"ping", EncryptionLevel::Unspecified).unwrap();
        assert!(!client.is_idle(Duration::from_secs(1)));
    }
}

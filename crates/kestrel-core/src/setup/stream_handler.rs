// ============================================
// File: crates/kestrel-core/src/setup/stream_handler.rs
// ============================================
//! # Crypto Stream Handler
//!
//! ## Creation Reason
//! Runs the handshake message loop: reads frames from the crypto stream,
//! feeds them to the handshake engine and applies the resulting events
//! (send, install keys, complete) to the connection's crypto setup.
//!
//! ## Lifecycle
//! ```text
//! start() ─► events ─► loop { read ─► frames ─► on_message ─► events }
//!                                    │
//!          shutdown signal ──────────┴─► HandshakeCancelled
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Runs at most once per connection
//! - Key installation is synchronous, so cancelling (signal or dropping
//!   the future) always leaves the last fully installed level in force
//! - A received `HandshakeReject` is never answered with another reject
//!
//! ## Last Modified
//! v0.1.0 - Initial stream handler

use std::sync::atomic::Ordering;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use kestrel_transport::CryptoStream;

use crate::error::{CoreError, Result};
use crate::protocol::{
    encode_frame, FrameDecoder, HandshakeMessage, HandshakeReject, RejectReason,
};
use crate::setup::crypto_setup::CryptoSetup;
use crate::setup::engine::{HandshakeEngine, HandshakeEvent};

/// Bytes requested from the crypto stream per read.
const READ_BUFFER_SIZE: usize = 2048;

impl CryptoSetup {
    /// Drives the handshake on `stream` until it completes or fails.
    ///
    /// On success `ForwardSecure` keys are installed and
    /// `handshake_complete()` is `true`.
    ///
    /// # Arguments
    /// * `stream` - Byte channel carrying handshake frames
    /// * `engine` - Handshake state machine for our perspective
    /// * `shutdown` - Fires when the owning connection is torn down
    ///
    /// # Errors
    /// - `InvalidState` when called a second time
    /// - `HandshakeCancelled` when `shutdown` fires
    /// - `HandshakeFailure` for everything else
    pub async fn handle_crypto_stream<S, E>(
        &self,
        stream: &mut S,
        engine: &mut E,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        S: CryptoStream + ?Sized,
        E: HandshakeEngine + ?Sized,
    {
        if engine.perspective() != self.perspective() {
            return Err(CoreError::invalid_state(
                "handle crypto stream",
                format!("{} handshake engine", self.perspective()),
            ));
        }
        if self.handshake_started.swap(true, Ordering::AcqRel) {
            return Err(CoreError::invalid_state(
                "handle crypto stream",
                "handshake not yet started",
            ));
        }

        debug!(
            connection_id = %self.connection_id(),
            perspective = %self.perspective(),
            "Crypto stream handler started"
        );

        match self.drive_handshake(stream, engine, &mut shutdown).await {
            Ok(()) => {
                info!(
                    connection_id = %self.connection_id(),
                    level = %self.encryption_level(),
                    "Handshake complete"
                );
                Ok(())
            }
            Err(err) => {
                if let Some(reason) = err.reject_reason() {
                    self.send_reject(stream, reason).await;
                }
                warn!(
                    connection_id = %self.connection_id(),
                    level = %self.encryption_level(),
                    error = %err,
                    "Handshake aborted"
                );
                Err(err.into_handshake_failure())
            }
        }
    }

    async fn drive_handshake<S, E>(
        &self,
        stream: &mut S,
        engine: &mut E,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<()>
    where
        S: CryptoStream + ?Sized,
        E: HandshakeEngine + ?Sized,
    {
        let events = engine.start()?;
        if self.apply_events(stream, events).await? {
            return Ok(());
        }

        let mut decoder = FrameDecoder::new(self.config.max_frame_size);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = tokio::select! {
                biased;
                _ = shutdown.recv() => return Err(CoreError::HandshakeCancelled),
                read = stream.read(&mut buf) => read?,
            };
            if n == 0 {
                return Err(CoreError::handshake(
                    "crypto stream closed before handshake completed",
                ));
            }

            decoder.extend(&buf[..n]);
            while let Some(frame) = decoder.next_frame()? {
                let message = HandshakeMessage::decode(&frame)?;
                if let HandshakeMessage::Reject(reject) = message {
                    return Err(CoreError::PeerRejected {
                        reason: reject.reason,
                    });
                }
                let events = engine.on_message(message)?;
                if self.apply_events(stream, events).await? {
                    return Ok(());
                }
            }
        }
    }

    /// Applies engine events in order. Returns `true` on completion.
    async fn apply_events<S>(&self, stream: &mut S, events: Vec<HandshakeEvent>) -> Result<bool>
    where
        S: CryptoStream + ?Sized,
    {
        let mut complete = false;
        for event in events {
            match event {
                HandshakeEvent::Send(message) => {
                    let frame = encode_frame(&message.to_bytes())?;
                    stream.write_all(&frame).await?;
                    debug!(
                        connection_id = %self.connection_id(),
                        message = ?message.message_type(),
                        "Handshake message sent"
                    );
                }
                HandshakeEvent::InstallKeys(material) => self.install_keys(material)?,
                HandshakeEvent::Complete => {
                    self.state().mark_complete()?;
                    complete = true;
                }
            }
        }
        Ok(complete)
    }

    async fn send_reject<S>(&self, stream: &mut S, reason: RejectReason)
    where
        S: CryptoStream + ?Sized,
    {
        let message = HandshakeMessage::Reject(HandshakeReject { reason });
        let sent = match encode_frame(&message.to_bytes()) {
            Ok(frame) => stream.write_all(&frame).await.map_err(CoreError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            debug!(
                connection_id = %self.connection_id(),
                %reason,
                error = %err,
                "Could not deliver handshake reject"
            );
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kestrel_common::{ConnectionId, PacketNumber, Perspective};
    use kestrel_transport::MemoryCryptoStream;

    use super::*;
    use crate::crypto::{ClientHandshake, IdentityKeyPair, ServerHandshake, StaticKeyPair};
    use crate::protocol::{EncryptionLevel, SupportedVersions, Version};
    use crate::setup::crypto_setup::CryptoSetupConfig;

    fn setups() -> (CryptoSetup, CryptoSetup) {
        let id = ConnectionId::generate();
        (
            CryptoSetup::new(id, Perspective::Client, CryptoSetupConfig::default()),
            CryptoSetup::new(id, Perspective::Server, CryptoSetupConfig::default()),
        )
    }

    fn server_engine() -> ServerHandshake {
        ServerHandshake::new(
            Arc::new(IdentityKeyPair::generate()),
            Arc::new(StaticKeyPair::generate()),
            SupportedVersions::default(),
        )
    }

    fn client_engine(version: Version) -> ClientHandshake {
        ClientHandshake::new(Arc::new(IdentityKeyPair::generate()), version)
    }

    #[tokio::test]
    async fn test_full_handshake_over_memory_stream() {
        let (client, server) = setups();
        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut client_engine = client_engine(Version::default());
        let mut server_engine = server_engine();

        let (client_result, server_result) = tokio::join!(
            client.handle_crypto_stream(
                &mut client_stream,
                &mut client_engine,
                shutdown_rx.resubscribe()
            ),
            server.handle_crypto_stream(
                &mut server_stream,
                &mut server_engine,
                shutdown_rx.resubscribe()
            ),
        );
        client_result.unwrap();
        server_result.unwrap();

        for setup in [&client, &server] {
            assert!(setup.handshake_complete());
            assert_eq!(setup.encryption_level(), EncryptionLevel::ForwardSecure);
            assert_eq!(
                setup.state().installed_levels(),
                EncryptionLevel::INSTALLABLE.to_vec()
            );
        }
        assert_eq!(client.diversification_nonce(), server.diversification_nonce());
        assert!(server.diversification_nonce().is_some());

        let pn = PacketNumber::new(1);
        let (sealed, level) = client
            .seal(b"after handshake", pn, b"hdr", EncryptionLevel::Unspecified)
            .unwrap();
        assert_eq!(level, EncryptionLevel::ForwardSecure);
        let (plaintext, level) = server.open(&sealed, pn, b"hdr").unwrap();
        assert_eq!(plaintext, b"after handshake");
        assert_eq!(level, EncryptionLevel::ForwardSecure);

        let (sealed, _) = server
            .seal(b"retransmit", pn, b"hdr", EncryptionLevel::Secure)
            .unwrap();
        assert_eq!(client.open(&sealed, pn, b"hdr").unwrap().1, EncryptionLevel::Secure);
    }

    #[tokio::test]
    async fn test_second_invocation_is_an_error() {
        let (client, _server) = setups();
        let (mut stream, _peer) = MemoryCryptoStream::pair();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut engine = client_engine(Version::default());

        shutdown_tx.send(()).unwrap();
        let first = client
            .handle_crypto_stream(&mut stream, &mut engine, shutdown_rx)
            .await;
        assert!(matches!(first, Err(CoreError::HandshakeCancelled)));

        let mut engine = client_engine(Version::default());
        let second = client
            .handle_crypto_stream(&mut stream, &mut engine, shutdown_tx.subscribe())
            .await;
        assert!(matches!(second, Err(CoreError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_last_installed_level() {
        let (_client, server) = setups();
        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        // Client sends its hello and then goes silent.
        let mut client_engine = client_engine(Version::default());
        let mut events = client_engine.start().unwrap();
        let Some(HandshakeEvent::Send(hello)) = events.pop() else {
            panic!("expected ClientHello");
        };
        client_stream
            .write_all(&encode_frame(&hello.to_bytes()).unwrap())
            .await
            .unwrap();

        let mut server_engine = server_engine();
        let handler =
            server.handle_crypto_stream(&mut server_stream, &mut server_engine, shutdown_rx);
        let cancel = async {
            let mut buf = [0u8; 512];
            // ServerHello arriving means Secure is installed.
            let n = client_stream.read(&mut buf).await.unwrap();
            assert!(n > 0);
            shutdown_tx.send(()).unwrap();
        };
        let (result, ()) = tokio::join!(handler, cancel);

        assert!(matches!(result, Err(CoreError::HandshakeCancelled)));
        assert_eq!(server.encryption_level(), EncryptionLevel::Secure);
        assert!(server.diversification_nonce().is_some());
        assert!(!server.handshake_complete());
    }

    #[tokio::test]
    async fn test_reject_propagates_to_peer() {
        let (client, server) = setups();
        let (mut client_stream, mut server_stream) = MemoryCryptoStream::pair();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut client_engine = client_engine(Version::new(99));
        let mut server_engine = server_engine();

        let (client_result, server_result) = tokio::join!(
            client.handle_crypto_stream(
                &mut client_stream,
                &mut client_engine,
                shutdown_rx.resubscribe()
            ),
            server.handle_crypto_stream(
                &mut server_stream,
                &mut server_engine,
                shutdown_rx.resubscribe()
            ),
        );

        let client_err = client_result.unwrap_err();
        assert!(matches!(client_err, CoreError::HandshakeFailure { .. }));
        assert!(client_err.to_string().contains("unsupported version"));
        assert!(matches!(server_result, Err(CoreError::HandshakeFailure { .. })));

        for setup in [&client, &server] {
            assert_eq!(setup.encryption_level(), EncryptionLevel::Unencrypted);
            assert!(!setup.handshake_complete());
        }
    }

    #[tokio::test]
    async fn test_peer_close_is_handshake_failure() {
        let (_client, server) = setups();
        let (client_stream, mut server_stream) = MemoryCryptoStream::pair();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        drop(client_stream);

        let mut engine = server_engine();
        let result = server
            .handle_crypto_stream(&mut server_stream, &mut engine, shutdown_rx)
            .await;
        assert!(matches!(result, Err(CoreError::HandshakeFailure { .. })));
    }

    #[tokio::test]
    async fn test_engine_perspective_must_match() {
        let (client, _server) = setups();
        let (mut stream, _peer) = MemoryCryptoStream::pair();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let mut engine = server_engine();
        let result = client
            .handle_crypto_stream(&mut stream, &mut engine, shutdown_rx)
            .await;
        assert!(matches!(result, Err(CoreError::InvalidState { .. })));
    }
}

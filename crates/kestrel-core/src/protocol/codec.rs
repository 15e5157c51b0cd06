// ============================================
// File: crates/kestrel-core/src/protocol/codec.rs
// ============================================
//! # Handshake Codec
//!
//! ## Creation Reason
//! Binary encoding of handshake messages and the length-prefixed framing
//! used to carry them over the byte-oriented crypto stream.
//!
//! ## Main Functionality
//! - `Codec` trait: generic encode/decode interface
//! - `ProtocolCodec`: implementation for every handshake message
//! - `HandshakeMessage`: any message, dispatched on the type byte
//! - `encode_frame` / `FrameDecoder`: `u16` LE length prefix framing
//!
//! ## Wire Format
//! ```text
//! ┌─────────────────┬──────────────────────────────┐
//! │ length (2B LE)  │ message (type byte + fields) │
//! └─────────────────┴──────────────────────────────┘
//! ```
//! All multi-byte integers are little-endian.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always validate buffer lengths before reading
//! - `FrameDecoder` must reject a frame whose declared length exceeds
//!   `max_frame_size` before buffering it
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CoreError, Result};
use crate::protocol::messages::{
    ClientFinished, ClientHello, HandshakeReject, MessageType, RejectReason, ServerHello,
    CLIENT_FINISHED_SIZE, CLIENT_HELLO_SIZE, HANDSHAKE_REJECT_SIZE, SERVER_HELLO_SIZE,
};

// ============================================
// Constants
// ============================================

/// Size of the frame length prefix.
pub const FRAME_HEADER_SIZE: usize = 2;

/// Default upper bound on a single handshake frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding handshake messages.
pub trait Codec<T> {
    /// Encodes a message into a byte buffer.
    fn encode(&self, msg: &T, buf: &mut BytesMut);

    /// Decodes a message from bytes.
    ///
    /// # Errors
    /// Returns an error if the buffer is short or the type byte is wrong.
    fn decode(&self, buf: &mut Bytes) -> Result<T>;
}

// ============================================
// ProtocolCodec
// ============================================

/// Codec implementation for all handshake messages.
#[derive(Debug, Default, Clone)]
pub struct ProtocolCodec;

impl ProtocolCodec {
    /// Creates a new protocol codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Identifies the message type without consuming it.
    ///
    /// # Errors
    /// Returns an error for an empty buffer or an unknown type byte.
    pub fn peek_message_type(buf: &[u8]) -> Result<MessageType> {
        let Some(&first) = buf.first() else {
            return Err(CoreError::too_short(1, 0));
        };
        MessageType::from_byte(first).ok_or(CoreError::UnknownMessageType(first))
    }

    fn expect_header(buf: &mut Bytes, expected: MessageType) -> Result<()> {
        let size = expected.wire_size();
        if buf.len() < size {
            return Err(CoreError::too_short(size, buf.len()));
        }
        let message_type = buf.get_u8();
        if message_type != expected.as_byte() {
            return Err(CoreError::malformed(format!(
                "expected {:?} (0x{:02x}), got 0x{:02x}",
                expected,
                expected.as_byte(),
                message_type
            )));
        }
        Ok(())
    }
}

fn take_array<const N: usize>(buf: &mut Bytes) -> [u8; N] {
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    out
}

// ============================================
// ClientHello Codec
// ============================================

impl Codec<ClientHello> for ProtocolCodec {
    fn encode(&self, msg: &ClientHello, buf: &mut BytesMut) {
        buf.reserve(CLIENT_HELLO_SIZE);
        buf.put_slice(&msg.signed_bytes());
        buf.put_slice(&msg.signature);
    }

    fn decode(&self, buf: &mut Bytes) -> Result<ClientHello> {
        Self::expect_header(buf, MessageType::ClientHello)?;
        Ok(ClientHello {
            version: buf.get_u32_le(),
            client_public_key: take_array(buf),
            client_initial_key: take_array(buf),
            client_forward_key: take_array(buf),
            timestamp: buf.get_u64_le(),
            signature: take_array(buf),
        })
    }
}

// ============================================
// ServerHello Codec
// ============================================

impl Codec<ServerHello> for ProtocolCodec {
    fn encode(&self, msg: &ServerHello, buf: &mut BytesMut) {
        buf.reserve(SERVER_HELLO_SIZE);
        buf.put_u8(MessageType::ServerHello.as_byte());
        buf.put_u32_le(msg.version);
        buf.put_slice(&msg.server_public_key);
        buf.put_slice(&msg.server_config_key);
        buf.put_slice(&msg.server_forward_key);
        buf.put_slice(&msg.diversification_nonce);
        buf.put_slice(&msg.signature);
    }

    fn decode(&self, buf: &mut Bytes) -> Result<ServerHello> {
        Self::expect_header(buf, MessageType::ServerHello)?;
        Ok(ServerHello {
            version: buf.get_u32_le(),
            server_public_key: take_array(buf),
            server_config_key: take_array(buf),
            server_forward_key: take_array(buf),
            diversification_nonce: take_array(buf),
            signature: take_array(buf),
        })
    }
}

// ============================================
// ClientFinished / HandshakeReject Codec
// ============================================

impl Codec<ClientFinished> for ProtocolCodec {
    fn encode(&self, msg: &ClientFinished, buf: &mut BytesMut) {
        buf.reserve(CLIENT_FINISHED_SIZE);
        buf.put_u8(MessageType::ClientFinished.as_byte());
        buf.put_slice(&msg.signature);
    }

    fn decode(&self, buf: &mut Bytes) -> Result<ClientFinished> {
        Self::expect_header(buf, MessageType::ClientFinished)?;
        Ok(ClientFinished {
            signature: take_array(buf),
        })
    }
}

impl Codec<HandshakeReject> for ProtocolCodec {
    fn encode(&self, msg: &HandshakeReject, buf: &mut BytesMut) {
        buf.reserve(HANDSHAKE_REJECT_SIZE);
        buf.put_u8(MessageType::HandshakeReject.as_byte());
        buf.put_u8(msg.reason.as_byte());
    }

    fn decode(&self, buf: &mut Bytes) -> Result<HandshakeReject> {
        Self::expect_header(buf, MessageType::HandshakeReject)?;
        Ok(HandshakeReject {
            reason: RejectReason::from_byte(buf.get_u8()),
        })
    }
}

// ============================================
// HandshakeMessage
// ============================================

/// Any handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// See [`ClientHello`].
    ClientHello(ClientHello),
    /// See [`ServerHello`].
    ServerHello(ServerHello),
    /// See [`ClientFinished`].
    ClientFinished(ClientFinished),
    /// See [`HandshakeReject`].
    Reject(HandshakeReject),
}

impl HandshakeMessage {
    /// Type of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::ClientHello(_) => MessageType::ClientHello,
            Self::ServerHello(_) => MessageType::ServerHello,
            Self::ClientFinished(_) => MessageType::ClientFinished,
            Self::Reject(_) => MessageType::HandshakeReject,
        }
    }

    /// Encodes the message without framing.
    #[must_use]
    pub fn to_bytes(&self) -> BytesMut {
        let codec = ProtocolCodec;
        let mut buf = BytesMut::with_capacity(self.message_type().wire_size());
        match self {
            Self::ClientHello(m) => codec.encode(m, &mut buf),
            Self::ServerHello(m) => codec.encode(m, &mut buf),
            Self::ClientFinished(m) => codec.encode(m, &mut buf),
            Self::Reject(m) => codec.encode(m, &mut buf),
        }
        buf
    }

    /// Decodes one complete, unframed message.
    ///
    /// # Errors
    /// Returns a protocol error for unknown types, wrong sizes or
    /// trailing bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let message_type = ProtocolCodec::peek_message_type(data)?;
        if data.len() != message_type.wire_size() {
            return Err(CoreError::malformed(format!(
                "{:?} must be {} bytes, got {}",
                message_type,
                message_type.wire_size(),
                data.len()
            )));
        }
        let codec = ProtocolCodec;
        let mut buf = Bytes::copy_from_slice(data);
        Ok(match message_type {
            MessageType::ClientHello => Self::ClientHello(codec.decode(&mut buf)?),
            MessageType::ServerHello => Self::ServerHello(codec.decode(&mut buf)?),
            MessageType::ClientFinished => Self::ClientFinished(codec.decode(&mut buf)?),
            MessageType::HandshakeReject => Self::Reject(codec.decode(&mut buf)?),
        })
    }
}

// ============================================
// Framing
// ============================================

/// Prefixes `payload` with its `u16` LE length.
///
/// # Errors
/// Returns `MessageTooLarge` if the payload does not fit the prefix.
pub fn encode_frame(payload: &[u8]) -> Result<BytesMut> {
    let len = u16::try_from(payload.len()).map_err(|_| CoreError::MessageTooLarge {
        max: usize::from(u16::MAX),
        actual: payload.len(),
    })?;
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u16_le(len);
    buf.put_slice(payload);
    Ok(buf)
}

/// Reassembles frames from arbitrary read boundaries.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Creates a decoder that refuses frames larger than `max_frame_size`.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet returned as a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pops the next complete frame payload, if one is buffered.
    ///
    /// # Errors
    /// Returns `MessageTooLarge` if the declared length exceeds the limit.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let declared = usize::from(u16::from_le_bytes([self.buffer[0], self.buffer[1]]));
        if declared > self.max_frame_size {
            return Err(CoreError::MessageTooLarge {
                max: self.max_frame_size,
                actual: declared,
            });
        }
        if self.buffer.len() < FRAME_HEADER_SIZE + declared {
            return Ok(None);
        }
        self.buffer.advance(FRAME_HEADER_SIZE);
        Ok(Some(self.buffer.split_to(declared).freeze()))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

// ============================================
// Tests
// ============================================

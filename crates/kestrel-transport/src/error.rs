// ============================================
// File: crates/kestrel-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial transport error definitions

use thiserror::Error;

use kestrel_common::error::CommonError;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by crypto stream implementations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The stream was closed locally; no further I/O is possible.
    #[error("Crypto stream is closed")]
    StreamClosed,

    /// The peer's buffer is full.
    #[error("Crypto stream buffer full: {pending} bytes pending (limit: {limit})")]
    BufferFull {
        /// Bytes already queued
        pending: usize,
        /// Queue limit in bytes
        limit: usize,
    },

    /// Underlying I/O failed.
    #[error("Crypto stream I/O failed: {context}")]
    Io {
        /// Operation being performed
        context: String,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// Error from the common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` if the stream can no longer be used.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::StreamClosed | Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::BufferFull { pending: 10, limit: 8 };
        assert!(err.to_string().contains("10"));
        assert!(TransportError::StreamClosed.is_closed());
        assert!(!err.is_closed());
    }
}

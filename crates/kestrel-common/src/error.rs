// ============================================
// File: crates/kestrel-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Base error enum shared by every kestrel crate. Crate-specific error
//! types wrap `CommonError` through `#[from]` so `?` works across layers.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never put key material, nonces or plaintext into error messages
//! - Keep variants coarse; crate errors carry the specifics
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions
//! v0.1.1 - Trimmed to the length and decoding failures id parsing produces

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for operations that fail with [`CommonError`].
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Errors shared across kestrel crates.
#[derive(Error, Debug)]
pub enum CommonError {
    /// Data length doesn't match the expected size.
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Failed to decode data.
    #[error("Decoding error: {context}")]
    Decoding {
        /// What was being decoded
        context: String,
        /// Error details
        details: String,
    },
}

impl CommonError {
    /// Creates an `InvalidLength` error.
    #[must_use]
    pub const fn invalid_length(expected: usize, actual: usize) -> Self {
        Self::InvalidLength { expected, actual }
    }

    /// Creates a `Decoding` error.
    pub fn decoding(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Decoding {
            context: context.into(),
            details: details.into(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommonError::invalid_length(32, 5);
        assert!(err.to_string().contains("32"));
        assert!(err.to_string().contains('5'));

        let err = CommonError::decoding("connection id", "odd number of digits");
        assert!(err.to_string().contains("connection id"));
    }
}

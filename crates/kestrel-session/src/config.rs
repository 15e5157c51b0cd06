// ============================================
// File: crates/kestrel-session/src/config.rs
// ============================================
//! # Endpoint Configuration
//!
//! ## Creation Reason
//! One TOML document configures an endpoint: the versions it speaks, how
//! the handshake and packet protection behave, and connection limits.
//!
//! ## Main Functionality
//! - `EndpointConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Conversion into the per-connection `CryptoSetupConfig`
//!
//! ## Configuration Sections
//! - `versions`: Supported protocol versions, most preferred first
//! - `handshake`: Timeout, timestamp skew, open policy, frame size
//! - `limits`: Connection count and idle timeout
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [versions]
//! supported = [1]
//!
//! [handshake]
//! timeout_secs = 10
//! max_timestamp_skew_secs = 60
//! open_policy = "all_lower"
//! retire_superseded_levels = true
//! max_frame_size = 4096
//!
//! [limits]
//! max_connections = 1000
//! idle_timeout_secs = 300
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The version list is plain configuration; nothing mutates it at runtime
//! - Validate config before creating an `Endpoint`
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use kestrel_core::{CryptoSetupConfig, OpenPolicy, SupportedVersions};

use crate::error::{Result, SessionError};

// ============================================
// EndpointConfig
// ============================================

/// Main endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Protocol versions.
    #[serde(default)]
    pub versions: VersionsConfig,

    /// Handshake and packet protection behaviour.
    #[serde(default)]
    pub handshake: HandshakeConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EndpointConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SessionError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SessionError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the string cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SessionError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.handshake.validate()?;
        self.limits.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Options for each connection's `CryptoSetup`.
    #[must_use]
    pub fn crypto_setup_config(&self) -> CryptoSetupConfig {
        CryptoSetupConfig {
            open_policy: self.handshake.open_policy,
            retire_superseded_levels: self.handshake.retire_superseded_levels,
            max_frame_size: self.handshake.max_frame_size,
        }
    }

    /// Supported versions, most preferred first.
    #[must_use]
    pub fn supported_versions(&self) -> &SupportedVersions {
        &self.versions.supported
    }

    /// Handshake deadline.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake.timeout_secs)
    }

    /// Connections idle longer than this are reaped.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.idle_timeout_secs)
    }
}

// ============================================
// VersionsConfig
// ============================================

/// Versions section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionsConfig {
    /// Non-empty, duplicate-free, most preferred first.
    #[serde(default)]
    pub supported: SupportedVersions,
}

// ============================================
// HandshakeConfig
// ============================================

/// Handshake section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Seconds allowed for the whole handshake.
    #[serde(default = "default_handshake_timeout")]
    pub timeout_secs: u64,

    /// Allowed clock difference for ClientHello timestamps.
    #[serde(default = "default_timestamp_skew")]
    pub max_timestamp_skew_secs: u64,

    /// Levels `open` tries below the current one.
    #[serde(default)]
    pub open_policy: OpenPolicy,

    /// Stop accepting levels below the highest one the peer has sent at.
    #[serde(default = "default_retire")]
    pub retire_superseded_levels: bool,

    /// Largest handshake frame accepted.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_timestamp_skew() -> u64 {
    kestrel_core::crypto::handshake::DEFAULT_MAX_TIMESTAMP_SKEW_SECS
}

fn default_retire() -> bool {
    true
}

fn default_max_frame_size() -> usize {
    kestrel_core::protocol::codec::DEFAULT_MAX_FRAME_SIZE
}

impl HandshakeConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(SessionError::config_invalid(
                "handshake.timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.max_timestamp_skew_secs == 0 {
            return Err(SessionError::config_invalid(
                "handshake.max_timestamp_skew_secs",
                "must be greater than 0",
            ));
        }

        // u16 length prefix; the largest message must still fit.
        let largest = kestrel_core::protocol::messages::SERVER_HELLO_SIZE + 1;
        let ceiling = usize::from(u16::MAX);
        if self.max_frame_size < largest || self.max_frame_size > ceiling {
            return Err(SessionError::config_invalid(
                "handshake.max_frame_size",
                format!("must be between {largest} and {ceiling}"),
            ));
        }

        Ok(())
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_handshake_timeout(),
            max_timestamp_skew_secs: default_timestamp_skew(),
            open_policy: OpenPolicy::default(),
            retire_superseded_levels: default_retire(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Idle timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_idle_timeout() -> u64 {
    300
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(SessionError::config_invalid(
                "limits.max_connections",
                "must be greater than 0",
            ));
        }

        if self.idle_timeout_secs == 0 {
            return Err(SessionError::config_invalid(
                "limits.idle_timeout_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(SessionError::config_invalid(
                "logging.level",
                format!("unknown level '{}'", self.level),
            ));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

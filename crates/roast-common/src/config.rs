//! Configuration structures for the roast gateway daemon.
//!
//! Supports TOML deserialization with sensible defaults for development and
//! explicit values for production deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the web/WebSocket server binds to.
    pub bind_host: String,

    /// Port the web/WebSocket server binds to.
    pub bind_port: u16,

    /// Sampling interval used when a machine's catalog entry doesn't
    /// specify one.
    #[serde(with = "humantime_serde")]
    pub default_sampling_interval: Duration,

    /// Per-request I/O timeout for driver transports.
    #[serde(with = "humantime_serde")]
    pub driver_timeout: Duration,

    /// Consecutive transient I/O failures before a machine is marked faulted.
    pub max_consecutive_errors: u32,

    /// Depth of each session's in-memory sample ring buffer.
    pub ring_capacity: usize,

    /// Defaults used when spawning simulator instances.
    pub simulator: SimulatorDefaultsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_host: String::from("127.0.0.1"),
            bind_port: 8000,
            default_sampling_interval: Duration::from_secs(3),
            driver_timeout: Duration::from_secs(1),
            max_consecutive_errors: 5,
            ring_capacity: 120,
            simulator: SimulatorDefaultsConfig::default(),
        }
    }
}

/// Defaults for simulator instances spawned by the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorDefaultsConfig {
    /// Loopback host simulators bind to.
    pub host: String,

    /// Inclusive port range scanned for a free port.
    pub port_range: (u16, u16),
}

impl Default for SimulatorDefaultsConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port_range: (15502, 15600),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

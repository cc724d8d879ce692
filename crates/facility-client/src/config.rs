//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/facility/config.toml` by default. Every field is optional;
//! command-line flags override whatever the file sets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelConfig, DEFAULT_RETRIES};
use crate::error::{ClientError, ClientResult};
use crate::monitor::{DEFAULT_LIVENESS_THRESHOLD, MonitorConfig};

/// Configuration for the facility client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerSettings,
    pub transport: TransportSettings,
    pub monitor: MonitorSettings,
}

/// Where the booking server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Retry and fault injection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Attempts per request.
    pub retries: u32,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Probability of skipping a send, for testing.
    pub drop_rate: f64,
    /// Discard replies whose request id does not match.
    pub match_request_id: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout_ms: 3_000,
            drop_rate: 0.0,
            match_request_id: false,
        }
    }
}

/// Monitor polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Poll timeout in milliseconds.
    pub poll_interval_ms: u64,
    /// Silent polls before re-registering; 0 disables.
    pub liveness_threshold: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            liveness_threshold: DEFAULT_LIVENESS_THRESHOLD,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if there is
    /// no file.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facility")
    }

    /// `host:port` of the server.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default()
            .with_retries(self.transport.retries)
            .with_timeout(Duration::from_millis(self.transport.timeout_ms))
            .with_drop_rate(self.transport.drop_rate)
            .with_match_request_id(self.transport.match_request_id)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::default()
            .with_poll_interval(Duration::from_millis(self.monitor.poll_interval_ms))
            .with_liveness_threshold(self.monitor.liveness_threshold)
    }

    /// Checks every section, returning the first problem found.
    pub fn validate(&self) -> ClientResult<()> {
        if self.server.host.trim().is_empty() {
            return Err(ClientError::Config("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ClientError::Config("server.port must not be 0".into()));
        }
        self.channel_config().validate()?;
        self.monitor_config().validate()?;
        if self.monitor.poll_interval_ms >= self.transport.timeout_ms {
            tracing::warn!(
                poll_interval_ms = self.monitor.poll_interval_ms,
                timeout_ms = self.transport.timeout_ms,
                "monitor poll interval is not shorter than the request timeout"
            );
        }
        Ok(())
    }
}

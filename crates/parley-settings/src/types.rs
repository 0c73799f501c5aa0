//! Settings types for the relay server, the janitor and logging.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Which command set the relay serves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Peer discovery only (`ping`, `nick`, `reset`).
    #[default]
    Signaling,
    /// Discovery plus two-party sessions (`start`, `go`).
    Pairing,
}

impl RelayMode {
    /// Lowercase name as used in settings and on `/health`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signaling => "signaling",
            Self::Pairing => "pairing",
        }
    }

    /// Whether pairing commands and the paired-client exclusion rule apply.
    pub fn is_pairing(self) -> bool {
        self == Self::Pairing
    }
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelayMode {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "signaling" | "signalling" | "plain" => Ok(Self::Signaling),
            "pairing" | "paired" => Ok(Self::Pairing),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown relay mode: {other}"
            ))),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown log format: {other}"
            ))),
        }
    }
}

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Operating mode.
    pub mode: RelayMode,
    /// Network and transport settings.
    pub server: ServerSettings,
    /// Dead-entry sweep settings.
    pub janitor: JanitorSettings,
    /// Log subscriber settings.
    pub logging: LoggingSettings,
}

/// Network and transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Advertised scheme. TLS is terminated in front of the relay.
    pub protocol: String,
    /// Path on which WebSocket upgrades are accepted.
    pub ws_path: String,
    /// Directory served on every other path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
    /// Interval between server-initiated Ping frames, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Outbound frames buffered per connection before sends are dropped.
    pub max_send_queue: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            protocol: "http".to_string(),
            ws_path: "/websockets".to_string(),
            static_dir: Some("build".to_string()),
            heartbeat_interval_ms: 30_000,
            max_send_queue: 256,
            max_message_size: 64 * 1024,
        }
    }
}

/// Dead-entry sweep settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JanitorSettings {
    /// Sweep interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

/// Log subscriber settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive. `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl RelaySettings {
    /// Reject combinations the server cannot start with.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "wsPath must start with '/': {}",
                self.server.ws_path
            )));
        }
        if self.server.ws_path == "/health" {
            return Err(SettingsError::InvalidValue(
                "wsPath collides with /health".to_string(),
            ));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be positive".to_string(),
            ));
        }
        if self.janitor.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "janitor.intervalMs must be positive".to_string(),
            ));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxSendQueue must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

//! Bus configuration.
//!
//! [`BusConfig`] holds every tunable of the pipe transport. Hosts can build
//! it in code (usually through [`BusBuilder`](crate::BusBuilder)) or load it
//! from JSON:
//!
//! ```
//! use canbus_ipc::{BusConfig, Role};
//!
//! let config = BusConfig::from_json_str(r#"{ "channel": "vehicle", "role": "client" }"#).unwrap();
//! assert_eq!(config.role, Role::Client);
//! assert_eq!(config.connect_timeout().as_millis(), 2000);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};

/// Default connect timeout for the client role.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;

/// Default delay between failed connect attempts.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default idle poll interval while the client is connected.
pub const DEFAULT_IDLE_POLL_MS: u64 = 500;

/// Default backoff after a failed bind/accept.
pub const DEFAULT_ACCEPT_BACKOFF_MS: u64 = 200;

/// Default per-connection writer queue capacity (records).
pub const DEFAULT_WRITER_QUEUE_CAPACITY: usize = 256;

/// Default capacity of the frame and connection-state broadcast channels.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Which side of the channel this endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Multi-client hub: accepts peers and fans frames out to all of them.
    Server,
    /// Single endpoint that keeps reconnecting to a server.
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

impl FromStr for Role {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(Role::Server),
            "client" => Ok(Role::Client),
            other => Err(BusError::InvalidConfig(format!("unknown role '{}'", other))),
        }
    }
}

/// Configuration for an [`IpcCanBus`](crate::IpcCanBus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Channel name shared by every participant of one bus.
    pub channel: String,
    /// Server or client.
    pub role: Role,
    /// Directory holding Unix socket files. Defaults to the OS temp dir.
    /// Ignored on Windows.
    #[serde(default)]
    pub socket_dir: Option<PathBuf>,
    /// Client connect timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Client delay before retrying a failed connect.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Client poll interval while connected.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Server backoff after a failed bind/accept.
    #[serde(default = "default_accept_backoff_ms")]
    pub accept_backoff_ms: u64,
    /// Records queued per connection before sends to it are dropped.
    #[serde(default = "default_writer_queue_capacity")]
    pub writer_queue_capacity: usize,
    /// Capacity of each subscription channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_idle_poll_ms() -> u64 {
    DEFAULT_IDLE_POLL_MS
}

fn default_accept_backoff_ms() -> u64 {
    DEFAULT_ACCEPT_BACKOFF_MS
}

fn default_writer_queue_capacity() -> usize {
    DEFAULT_WRITER_QUEUE_CAPACITY
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl BusConfig {
    /// Configuration with defaults for every tunable.
    pub fn new(channel: impl Into<String>, role: Role) -> Self {
        Self {
            channel: channel.into(),
            role,
            socket_dir: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            accept_backoff_ms: DEFAULT_ACCEPT_BACKOFF_MS,
            writer_queue_capacity: DEFAULT_WRITER_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges. Channel naming is checked separately when the endpoint is resolved.
    pub fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            return Err(BusError::InvalidConfig("channel is required".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(BusError::InvalidConfig(
                "connect_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.writer_queue_capacity == 0 {
            return Err(BusError::InvalidConfig(
                "writer_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(BusError::InvalidConfig(
                "event_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Retry delay as a `Duration`.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Idle poll interval as a `Duration`.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Accept backoff as a `Duration`.
    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BusConfig::new("bus", Role::Server);
        assert_eq!(config.connect_timeout(), Duration::from_millis(2000));
        assert_eq!(config.retry_delay(), Duration::from_millis(500));
        assert_eq!(config.idle_poll(), Duration::from_millis(500));
        assert_eq!(config.accept_backoff(), Duration::from_millis(200));
        assert!(config.socket_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_fills_defaults() {
        let config = BusConfig::from_json_str(r#"{"channel":"car","role":"server"}"#).unwrap();
        assert_eq!(config, BusConfig::new("car", Role::Server));
    }

    #[test]
    fn test_json_overrides() {
        let config = BusConfig::from_json_str(
            r#"{"channel":"car","role":"client","retry_delay_ms":50,"socket_dir":"/run/can"}"#,
        )
        .unwrap();
        assert_eq!(config.retry_delay(), Duration::from_millis(50));
        assert_eq!(config.socket_dir, Some(PathBuf::from("/run/can")));
    }

    #[test]
    fn test_json_rejects_unknown_role() {
        let result = BusConfig::from_json_str(r#"{"channel":"car","role":"gateway"}"#);
        assert!(matches!(result, Err(BusError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_blank_channel() {
        let config = BusConfig::new("   ", Role::Client);
        assert!(matches!(config.validate(), Err(BusError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = BusConfig::new("bus", Role::Client);
        config.writer_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Server".parse::<Role>().unwrap(), Role::Server);
        assert_eq!(" client ".parse::<Role>().unwrap(), Role::Client);
        assert!("hub".parse::<Role>().is_err());
        assert_eq!(Role::Client.to_string(), "client");
    }
}

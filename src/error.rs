//! Error types for canbus-ipc.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all bus operations.
///
/// Transport failures are recovered inside the background tasks and reported
/// through logging and the failure hook; they never surface from
/// [`CanBus::send`](crate::CanBus::send) or [`IpcCanBus::start`](crate::IpcCanBus::start),
/// which only fails with [`BusError::NoRuntime`].
#[derive(Debug, Error)]
pub enum BusError {
    /// I/O error during pipe/socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or oversized record. The connection that produced it is abandoned.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer closed the stream before delivering a whole record.
    #[error("End of stream: expected {expected} bytes, received {received}")]
    EndOfStream {
        /// Bytes the pending record still needed.
        expected: usize,
        /// Bytes actually buffered when the stream ended.
        received: usize,
    },

    /// Connect attempt did not complete in time.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Per-peer writer queue is full; the record was dropped.
    #[error("Writer queue full")]
    QueueFull,

    /// Connection closed (writer task gone).
    #[error("Connection closed")]
    ConnectionClosed,

    /// Channel name cannot be mapped to a local endpoint.
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    /// Configuration value out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// `start()` was called outside a tokio runtime.
    #[error("No tokio runtime available to run the bus")]
    NoRuntime,

    /// Configuration document could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias using BusError.
pub type Result<T> = std::result::Result<T, BusError>;

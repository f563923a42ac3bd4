//! State shared by the listener and dialer engines.
//!
//! [`BusCore`] owns the subscription senders, the link state, the
//! cancellation token and the failure hook. Both engines hold it behind an
//! `Arc` and run the same per-connection read loop through it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::frame::CanFrame;
use crate::protocol::RecordBuffer;

/// Size of each socket read.
const READ_CHUNK_SIZE: usize = 4096;

/// Callback receiving every recovered transport failure.
///
/// The message has the form `canbus {role} channel '{name}' {operation} failed`.
pub type FailureHook = Arc<dyn Fn(&str, &BusError) + Send + Sync>;

/// Link state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LinkState {
    /// No usable connection.
    Disconnected = 0,
    /// Client connect attempt in flight.
    Connecting = 1,
    /// Client connected, or server with at least one peer.
    Connected = 2,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LinkState::Connecting,
            2 => LinkState::Connected,
            _ => LinkState::Disconnected,
        }
    }
}

pub(crate) struct BusCore {
    pub(crate) config: BusConfig,
    pub(crate) path: PathBuf,
    pub(crate) token: CancellationToken,
    frames: broadcast::Sender<CanFrame>,
    connection: broadcast::Sender<bool>,
    link: AtomicU8,
    failure_hook: Option<FailureHook>,
}

impl BusCore {
    pub(crate) fn new(config: BusConfig, path: PathBuf, failure_hook: Option<FailureHook>) -> Self {
        let (frames, _) = broadcast::channel(config.event_capacity);
        let (connection, _) = broadcast::channel(config.event_capacity);
        Self {
            config,
            path,
            token: CancellationToken::new(),
            frames,
            connection,
            link: AtomicU8::new(LinkState::Disconnected as u8),
            failure_hook,
        }
    }

    pub(crate) fn subscribe_frames(&self) -> broadcast::Receiver<CanFrame> {
        self.frames.subscribe()
    }

    pub(crate) fn subscribe_connection(&self) -> broadcast::Receiver<bool> {
        self.connection.subscribe()
    }

    pub(crate) fn link_state(&self) -> LinkState {
        LinkState::from_u8(self.link.load(Ordering::Acquire))
    }

    /// Update the link state; notify subscribers when "connected" flips.
    pub(crate) fn set_link_state(&self, state: LinkState) {
        let previous = LinkState::from_u8(self.link.swap(state as u8, Ordering::AcqRel));
        let was_connected = previous == LinkState::Connected;
        let is_connected = state == LinkState::Connected;
        if was_connected != is_connected {
            tracing::info!(
                "canbus {} channel '{}' {}",
                self.config.role,
                self.config.channel,
                if is_connected { "connected" } else { "disconnected" }
            );
            let _ = self.connection.send(is_connected);
        }
    }

    pub(crate) fn publish(&self, frame: CanFrame) {
        tracing::trace!("[{}] rx {}", self.config.channel, frame);
        // No subscribers is not an error on a bus
        let _ = self.frames.send(frame);
    }

    /// Log a recovered failure and hand it to the hook.
    pub(crate) fn report_failure(&self, operation: &str, error: &BusError) {
        let message = format!(
            "canbus {} channel '{}' {} failed",
            self.config.role, self.config.channel, operation
        );
        tracing::warn!("{}: {}", message, error);
        if let Some(hook) = &self.failure_hook {
            hook(&message, error);
        }
    }

    /// Sleep unless cancelled first. Returns `false` when cancelled.
    pub(crate) async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Decode records from one connection and publish them in arrival order.
    ///
    /// Returns `Ok(())` on a clean close or cancellation; any decode error
    /// ends the loop and the connection with it.
    pub(crate) async fn read_frames<R>(&self, mut reader: R, token: &CancellationToken) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = RecordBuffer::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                read = reader.read(&mut chunk) => read?,
            };
            if n == 0 {
                return buffer.finish();
            }

            buffer.extend(&chunk[..n]);
            while let Some(frame) = buffer.next_frame()? {
                self.publish(frame);
            }
        }
    }

    /// Report the writer task's error, if it ends with one, and end the
    /// connection with it so the read loop tears it down.
    pub(crate) fn watch_writer(
        self: &Arc<Self>,
        task: JoinHandle<Result<()>>,
        connection: CancellationToken,
    ) {
        let core = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(Err(e)) = task.await {
                core.report_failure("Write", &e);
            }
            connection.cancel();
        });
    }
}

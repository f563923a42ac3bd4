//! Pipe-backed bus endpoint and its builder.
//!
//! The [`BusBuilder`] provides a fluent API for configuring an endpoint. The
//! [`IpcCanBus`] manages the lifecycle:
//! 1. Resolve the channel name to a local endpoint
//! 2. `start()` spawns the accept loop (server) or supervision loop (client)
//! 3. `send()` and subscriptions run until `dispose()` or drop
//!
//! # Example
//!
//! ```ignore
//! use canbus_ipc::{CanBus, CanFrame, IpcCanBus, Role};
//!
//! #[tokio::main]
//! async fn main() -> canbus_ipc::Result<()> {
//!     let bus = IpcCanBus::builder("vehicle", Role::Client)
//!         .on_failure(|message, error| eprintln!("{message}: {error}"))
//!         .start()?;
//!
//!     let mut frames = bus.subscribe_frames();
//!     bus.send(&CanFrame::new(0x205, &[5, 1]));
//!     while let Ok(frame) = frames.recv().await {
//!         println!("{frame}");
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::bus::CanBus;
use crate::config::{BusConfig, Role};
use crate::error::{BusError, Result};
use crate::frame::CanFrame;
use crate::transport::{channel_path, BusCore, Dialer, FailureHook, LinkState, Listener};

/// Builder for configuring and creating an [`IpcCanBus`].
pub struct BusBuilder {
    config: BusConfig,
    failure_hook: Option<FailureHook>,
}

impl BusBuilder {
    /// Create a builder with default tunables.
    pub fn new(channel: impl Into<String>, role: Role) -> Self {
        Self::from_config(BusConfig::new(channel, role))
    }

    /// Start from an existing configuration, e.g. one loaded from JSON.
    pub fn from_config(config: BusConfig) -> Self {
        Self {
            config,
            failure_hook: None,
        }
    }

    /// Directory for the Unix socket file.
    ///
    /// Default: the OS temp dir. Ignored on Windows.
    pub fn socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.socket_dir = Some(dir.into());
        self
    }

    /// Client connect timeout.
    ///
    /// Default: 2 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = millis(timeout);
        self
    }

    /// Client delay between failed connect attempts.
    ///
    /// Default: 500 ms
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = millis(delay);
        self
    }

    /// Client poll interval while connected.
    ///
    /// Default: 500 ms
    pub fn idle_poll(mut self, interval: Duration) -> Self {
        self.config.idle_poll_ms = millis(interval);
        self
    }

    /// Server backoff after a failed bind or accept.
    ///
    /// Default: 200 ms
    pub fn accept_backoff(mut self, backoff: Duration) -> Self {
        self.config.accept_backoff_ms = millis(backoff);
        self
    }

    /// Records queued per connection before sends to it fail with `QueueFull`.
    ///
    /// Default: 256
    pub fn writer_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_queue_capacity = capacity;
        self
    }

    /// Capacity of the frame and connection-state subscriptions.
    ///
    /// Default: 1024
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Receive every recovered transport failure.
    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &BusError) + Send + Sync + 'static,
    {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    /// Validate the configuration and create the endpoint without starting it.
    pub fn build(self) -> Result<IpcCanBus> {
        IpcCanBus::with_hook(self.config, self.failure_hook)
    }

    /// Build and start. Must be called from within a tokio runtime.
    pub fn start(self) -> Result<IpcCanBus> {
        let bus = self.build()?;
        bus.start()?;
        Ok(bus)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

enum Engine {
    Server(Arc<Listener>),
    Client(Arc<Dialer>),
}

/// A CAN bus endpoint over a local pipe, in server or client role.
///
/// Dropping the endpoint disposes it.
pub struct IpcCanBus {
    core: Arc<BusCore>,
    engine: Engine,
    started: AtomicBool,
}

impl IpcCanBus {
    /// Create an endpoint from a configuration. Nothing runs until `start()`.
    pub fn new(config: BusConfig) -> Result<Self> {
        Self::with_hook(config, None)
    }

    /// Create a new bus builder.
    pub fn builder(channel: impl Into<String>, role: Role) -> BusBuilder {
        BusBuilder::new(channel, role)
    }

    fn with_hook(config: BusConfig, failure_hook: Option<FailureHook>) -> Result<Self> {
        config.validate()?;
        let path = channel_path(&config.channel, config.socket_dir.as_deref())?;
        let role = config.role;
        let core = Arc::new(BusCore::new(config, path, failure_hook));

        let engine = match role {
            Role::Server => Engine::Server(Arc::new(Listener::new(Arc::clone(&core)))),
            Role::Client => Engine::Client(Arc::new(Dialer::new(Arc::clone(&core)))),
        };

        Ok(Self {
            core,
            engine,
            started: AtomicBool::new(false),
        })
    }

    /// Spawn the background loops.
    ///
    /// Idempotent; ignored after `dispose()`. Transport failures are handled
    /// in the background, so the only error is calling this outside a tokio
    /// runtime.
    pub fn start(&self) -> Result<()> {
        if self.is_disposed() {
            tracing::debug!("canbus channel '{}' already disposed, not starting", self.channel());
            return Ok(());
        }
        Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match &self.engine {
            Engine::Server(listener) => listener.start(),
            Engine::Client(dialer) => dialer.start(),
        }
        tracing::info!(
            "canbus {} started on channel '{}' ({})",
            self.role(),
            self.channel(),
            self.path().display()
        );
        Ok(())
    }

    /// Stop every loop and release every connection.
    ///
    /// Idempotent and callable from any thread. Returns without waiting for
    /// the background tasks to unwind.
    pub fn dispose(&self) {
        if self.core.token.is_cancelled() {
            return;
        }
        self.core.token.cancel();

        match &self.engine {
            Engine::Server(listener) => listener.dispose(),
            Engine::Client(dialer) => dialer.dispose(),
        }
        tracing::debug!("canbus {} channel '{}' disposed", self.role(), self.channel());
    }

    /// Whether `dispose()` has run.
    pub fn is_disposed(&self) -> bool {
        self.core.token.is_cancelled()
    }

    /// Server or client.
    pub fn role(&self) -> Role {
        self.core.config.role
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.core.config.channel
    }

    /// Resolved local endpoint (socket file or pipe name).
    pub fn path(&self) -> &Path {
        &self.core.path
    }

    /// Current link state.
    pub fn link_state(&self) -> LinkState {
        self.core.link_state()
    }

    /// Number of live peers. Always 0 for a client.
    pub fn peer_count(&self) -> usize {
        match &self.engine {
            Engine::Server(listener) => listener.peer_count(),
            Engine::Client(_) => 0,
        }
    }
}

impl CanBus for IpcCanBus {
    fn is_connected(&self) -> bool {
        self.core.link_state() == LinkState::Connected
    }

    fn subscribe_connection(&self) -> broadcast::Receiver<bool> {
        self.core.subscribe_connection()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<CanFrame> {
        self.core.subscribe_frames()
    }

    fn send(&self, frame: &CanFrame) {
        match &self.engine {
            Engine::Server(listener) => listener.send(frame),
            Engine::Client(dialer) => dialer.send(frame),
        }
    }
}

impl Drop for IpcCanBus {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for IpcCanBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpcCanBus")
            .field("role", &self.role())
            .field("channel", &self.channel())
            .field("path", &self.path())
            .field("link_state", &self.link_state())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

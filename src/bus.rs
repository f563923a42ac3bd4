//! Bus abstraction shared by every transport.
//!
//! Hosts depend on [`CanBus`] only: query the link, subscribe to connection
//! changes and inbound frames, send frames. Each subscription is an
//! independent `tokio::sync::broadcast` receiver, so every subscriber sees
//! every notification. A receiver that falls more than the channel capacity
//! behind gets `RecvError::Lagged` and skips ahead.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::DEFAULT_EVENT_CAPACITY;
use crate::frame::CanFrame;

/// Capability set a host application needs from a CAN transport.
pub trait CanBus: Send + Sync {
    /// Whether the transport currently has a live link.
    fn is_connected(&self) -> bool;

    /// Subscribe to connection-state changes (`true` = connected).
    fn subscribe_connection(&self) -> broadcast::Receiver<bool>;

    /// Subscribe to inbound frames.
    fn subscribe_frames(&self) -> broadcast::Receiver<CanFrame>;

    /// Send a frame. Fire-and-forget: no acknowledgement, no error.
    fn send(&self, frame: &CanFrame);
}

impl<B: CanBus + ?Sized> CanBus for Arc<B> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn subscribe_connection(&self) -> broadcast::Receiver<bool> {
        (**self).subscribe_connection()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<CanFrame> {
        (**self).subscribe_frames()
    }

    fn send(&self, frame: &CanFrame) {
        (**self).send(frame);
    }
}

/// In-process bus: always connected, every sent frame is delivered back to
/// its own subscribers.
///
/// Useful for running a host without a peer process and for testing hosts.
#[derive(Debug, Clone)]
pub struct LoopbackBus {
    frames: broadcast::Sender<CanFrame>,
    connection: broadcast::Sender<bool>,
}

impl LoopbackBus {
    /// Create a loopback bus with the default subscription capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a loopback bus with a custom subscription capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (frames, _) = broadcast::channel(capacity);
        let (connection, _) = broadcast::channel(1);
        Self { frames, connection }
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CanBus for LoopbackBus {
    fn is_connected(&self) -> bool {
        true
    }

    fn subscribe_connection(&self) -> broadcast::Receiver<bool> {
        self.connection.subscribe()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<CanFrame> {
        self.frames.subscribe()
    }

    fn send(&self, frame: &CanFrame) {
        tracing::debug!("[loopback] {}", frame);
        // No subscribers is not an error on a bus
        let _ = self.frames.send(frame.clone());
    }
}

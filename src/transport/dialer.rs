//! Client role: connect supervision.
//!
//! A single supervision loop keeps the endpoint attached to its server:
//!
//! ```text
//! Disconnected ─► Connecting ─┬─► Connected ─(read loop ends)─► Disconnected
//!       ▲                     │
//!       └──(retry delay)──────┘ connect failed / timed out
//! ```
//!
//! While connected the loop idles, waking on a fixed interval or as soon as
//! the read loop reports the link gone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::error::BusError;
use crate::frame::CanFrame;
use crate::protocol::encode_record;

use super::core::{BusCore, LinkState};
use super::pipe::PipeStream;
use super::writer::{spawn_writer_task, WriterHandle};

/// The installed connection.
struct Link {
    id: u64,
    writer: WriterHandle,
}

pub(crate) struct Dialer {
    core: Arc<BusCore>,
    link: Mutex<Option<Link>>,
    next_id: AtomicU64,
    link_lost: Notify,
}

impl Dialer {
    pub(crate) fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
            link_lost: Notify::new(),
        }
    }

    /// Spawn the supervision loop. Must be called from within a tokio runtime.
    pub(crate) fn start(self: &Arc<Self>) {
        tokio::spawn(Arc::clone(self).supervise());
    }

    async fn supervise(self: Arc<Self>) {
        let token = self.core.token.clone();
        let connect_timeout = self.core.config.connect_timeout();
        let idle_poll = self.core.config.idle_poll();
        let retry_delay = self.core.config.retry_delay();

        while !token.is_cancelled() {
            if self.is_linked() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(idle_poll) => {}
                    _ = self.link_lost.notified() => {}
                }
                continue;
            }

            self.core.set_link_state(LinkState::Connecting);
            let attempt = tokio::select! {
                _ = token.cancelled() => break,
                attempt = tokio::time::timeout(connect_timeout, PipeStream::connect(&self.core.path)) => attempt,
            };

            match attempt {
                Ok(Ok(stream)) => self.install(stream),
                Ok(Err(e)) => {
                    self.connect_failed(&e);
                    if !self.core.pause(retry_delay).await {
                        break;
                    }
                }
                Err(_elapsed) => {
                    self.connect_failed(&BusError::ConnectTimeout(connect_timeout));
                    if !self.core.pause(retry_delay).await {
                        break;
                    }
                }
            }
        }

        // A connect attempt may have raced dispose
        self.core.set_link_state(LinkState::Disconnected);
        tracing::debug!("canbus client supervision loop stopped");
    }

    fn connect_failed(&self, error: &BusError) {
        self.core.set_link_state(LinkState::Disconnected);
        self.core.report_failure("Connect", error);
    }

    fn install(self: &Arc<Self>, stream: PipeStream) {
        let (reader, writer) = stream.into_split();
        let conn_token = self.core.token.child_token();
        let (handle, task) = spawn_writer_task(
            writer,
            self.core.config.writer_queue_capacity,
            conn_token.clone(),
        );
        self.core.watch_writer(task, conn_token.clone());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
            if self.core.token.is_cancelled() {
                conn_token.cancel();
                return;
            }
            *link = Some(Link { id, writer: handle });
            self.core.set_link_state(LinkState::Connected);
        }
        tracing::debug!("canbus client link {} up on {}", id, self.core.path.display());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.core.read_frames(reader, &conn_token).await {
                this.core.report_failure("ClientRead", &e);
            }
            conn_token.cancel();
            this.drop_link(id);
        });
    }

    fn drop_link(&self, id: u64) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if !link.as_ref().is_some_and(|l| l.id == id) {
            return;
        }
        *link = None;
        self.core.set_link_state(LinkState::Disconnected);
        drop(link);

        tracing::debug!("canbus client link {} down", id);
        self.link_lost.notify_one();
    }

    fn is_linked(&self) -> bool {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Enqueue the frame on the live link, or drop it when there is none.
    pub(crate) fn send(&self, frame: &CanFrame) {
        if self.core.token.is_cancelled() {
            return;
        }

        let writer = {
            let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
            link.as_ref().map(|l| l.writer.clone())
        };
        let Some(writer) = writer else {
            tracing::trace!("[{}] not connected, dropped {}", self.core.config.channel, frame);
            return;
        };

        match writer.try_send(encode_record(frame)) {
            Ok(()) => tracing::trace!("[{}] tx {}", self.core.config.channel, frame),
            // Writer already gone, the read loop has not dropped the link yet
            Err(BusError::ConnectionClosed) => {
                tracing::trace!("[{}] link closing, dropped {}", self.core.config.channel, frame)
            }
            Err(e) => self.core.report_failure("Send", &e),
        }
    }

    /// Drop the writer and report the link down.
    ///
    /// The token must already be cancelled.
    pub(crate) fn dispose(&self) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        *link = None;
        self.core.set_link_state(LinkState::Disconnected);
    }
}

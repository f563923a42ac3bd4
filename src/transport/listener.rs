//! Server role: accept loop and live-connection set.
//!
//! Every accepted peer gets a read loop and a writer task. The live set maps
//! a connection id to the peer's [`WriterHandle`]; a peer is removed the
//! moment its read loop ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::frame::CanFrame;
use crate::protocol::encode_record;

use super::core::{BusCore, LinkState};
use super::pipe::{PipeListener, PipeStream};
use super::writer::{spawn_writer_task, WriterHandle};

pub(crate) struct Listener {
    core: Arc<BusCore>,
    peers: Mutex<HashMap<u64, WriterHandle>>,
    next_id: AtomicU64,
}

impl Listener {
    pub(crate) fn new(core: Arc<BusCore>) -> Self {
        Self {
            core,
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawn the accept loop. Must be called from within a tokio runtime.
    pub(crate) fn start(self: &Arc<Self>) {
        tokio::spawn(Arc::clone(self).accept_loop());
    }

    async fn accept_loop(self: Arc<Self>) {
        let token = self.core.token.clone();
        let backoff = self.core.config.accept_backoff();
        let mut listener: Option<PipeListener> = None;

        while !token.is_cancelled() {
            if listener.is_none() {
                match PipeListener::bind(&self.core.path) {
                    Ok(bound) => {
                        tracing::debug!(
                            "canbus server listening on {}",
                            self.core.path.display()
                        );
                        listener = Some(bound);
                    }
                    Err(e) => {
                        self.core.report_failure("Accept", &e);
                        if !self.core.pause(backoff).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let Some(bound) = listener.as_mut() else {
                continue;
            };

            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = bound.accept() => accepted,
            };

            match accepted {
                Ok(stream) => self.register(stream),
                Err(e) => {
                    self.core.report_failure("Accept", &e);
                    // Rebind from scratch after a broken accept
                    listener = None;
                    if !self.core.pause(backoff).await {
                        break;
                    }
                }
            }
        }

        tracing::debug!("canbus server accept loop stopped");
    }

    fn register(self: &Arc<Self>, stream: PipeStream) {
        let (reader, writer) = stream.into_split();
        let conn_token = self.core.token.child_token();
        let (handle, task) = spawn_writer_task(
            writer,
            self.core.config.writer_queue_capacity,
            conn_token.clone(),
        );
        self.core.watch_writer(task, conn_token.clone());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
            if self.core.token.is_cancelled() {
                conn_token.cancel();
                return;
            }
            peers.insert(id, handle);
            self.core.set_link_state(LinkState::Connected);
            peers.len()
        };
        tracing::debug!("canbus server peer {} joined ({} live)", id, count);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.core.read_frames(reader, &conn_token).await {
                this.core.report_failure("PeerRead", &e);
            }
            conn_token.cancel();
            this.remove_peer(id);
        });
    }

    fn remove_peer(&self, id: u64) {
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        if peers.remove(&id).is_none() {
            return;
        }
        tracing::debug!("canbus server peer {} left ({} live)", id, peers.len());
        if peers.is_empty() {
            self.core.set_link_state(LinkState::Disconnected);
        }
    }

    /// Enqueue the frame on every live peer.
    pub(crate) fn send(&self, frame: &CanFrame) {
        if self.core.token.is_cancelled() {
            return;
        }

        let snapshot: Vec<WriterHandle> = {
            let peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
            peers.values().cloned().collect()
        };
        if snapshot.is_empty() {
            tracing::trace!("[{}] no peers, dropped {}", self.core.config.channel, frame);
            return;
        }

        let record = encode_record(frame);
        for handle in snapshot {
            if let Err(e) = handle.try_send(record.clone()) {
                self.core.report_failure("Send", &e);
            }
        }
        tracing::trace!("[{}] tx {}", self.core.config.channel, frame);
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every writer handle and report the link down.
    ///
    /// The token must already be cancelled.
    pub(crate) fn dispose(&self) {
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        peers.clear();
        self.core.set_link_state(LinkState::Disconnected);
    }
}

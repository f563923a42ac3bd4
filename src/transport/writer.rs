//! Dedicated writer task per connection.
//!
//! Every open connection gets one writer task that owns the write half and
//! drains a bounded mpsc queue of encoded records. Senders only enqueue, so a
//! peer that stops reading fills its own queue and nothing else:
//!
//! ```text
//! send() ─► snapshot ─┬─► WriterHandle ─► queue ─► Writer Task ─► Peer A
//!                     ├─► WriterHandle ─► queue ─► Writer Task ─► Peer B
//!                     └─► WriterHandle ─► queue ─► Writer Task ─► Peer N
//! ```
//!
//! Dropping every [`WriterHandle`] closes the queue; the task flushes what it
//! already took and exits, releasing the write half.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{BusError, Result};
use crate::protocol::MAX_ENCODED_RECORD_SIZE;

/// Maximum records coalesced into a single write.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for enqueueing records on one connection.
///
/// Cheap to clone; broadcast snapshots hold clones.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Enqueue an encoded record without waiting.
    ///
    /// Fails with `QueueFull` when the peer is not keeping up and with
    /// `ConnectionClosed` once the writer task has exited.
    pub fn try_send(&self, record: Bytes) -> Result<()> {
        self.tx.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BusError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => BusError::ConnectionClosed,
        })
    }

    /// Whether the writer task has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task for a write half.
///
/// The task ends when all handles are dropped, the token is cancelled, or a
/// write fails; the join handle yields the write error, if any.
pub fn spawn_writer_task<W>(
    writer: W,
    capacity: usize,
    token: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(writer_loop(rx, writer, token));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives records and writes them to the pipe.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    token: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = BytesMut::with_capacity(MAX_BATCH_SIZE * MAX_ENCODED_RECORD_SIZE);

    loop {
        let first = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            record = rx.recv() => match record {
                Some(r) => r,
                // All handles dropped, clean shutdown
                None => return Ok(()),
            },
        };

        batch.clear();
        batch.extend_from_slice(&first);

        // Collect additional ready records (non-blocking)
        let mut count = 1;
        while count < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(record) => {
                    batch.extend_from_slice(&record);
                    count += 1;
                }
                Err(_) => break,
            }
        }

        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            written = write_batch(&mut writer, &batch) => written?,
        }
        tracing::trace!("wrote {} record(s), {} bytes", count, batch.len());
    }
}

async fn write_batch<W>(writer: &mut W, batch: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(batch).await?;
    writer.flush().await?;
    Ok(())
}

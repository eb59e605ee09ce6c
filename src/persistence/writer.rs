//! Single serialized writer task for a [`Storage`].
//!
//! Callers enqueue writes without waiting. The task applies them strictly in
//! enqueue order, retrying a failed write before moving on, so a later write
//! for a group can never overtake an earlier one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{GroupRecord, Storage};
use crate::error::StorageError;
use crate::model::{GroupId, TabId};

/// One durable write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Upsert a group row with its ordered members.
    SaveGroup {
        record: GroupRecord,
        members: Vec<TabId>,
    },
    /// Soft-delete a group.
    DeleteGroup(GroupId),
    /// Replace a blob.
    SaveBlob { key: String, value: String },
}

impl WriteOp {
    fn apply(&self, storage: &dyn Storage) -> Result<(), StorageError> {
        match self {
            WriteOp::SaveGroup { record, members } => storage.save_group(record, members),
            WriteOp::DeleteGroup(id) => storage.delete_group(*id),
            WriteOp::SaveBlob { key, value } => storage.save_blob(key, value),
        }
    }

    fn label(&self) -> String {
        match self {
            WriteOp::SaveGroup { record, .. } => format!("save group {}", record.id),
            WriteOp::DeleteGroup(id) => format!("delete group {}", id),
            WriteOp::SaveBlob { key, .. } => format!("save blob {}", key),
        }
    }
}

/// Retry policy for failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterPolicy {
    /// Retries after the first failed attempt.
    pub retries: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl Default for WriterPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Default)]
pub struct WriterStats {
    applied: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
}

impl WriterStats {
    /// Writes that reached storage.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    /// Failed attempts that were retried.
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::SeqCst)
    }

    /// Writes given up on after exhausting retries.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

enum Command {
    Write(WriteOp),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the writer task. Clones share the same queue.
#[derive(Clone)]
pub struct PersistenceWriter {
    tx: mpsc::UnboundedSender<Command>,
    stats: Arc<WriterStats>,
}

impl std::fmt::Debug for PersistenceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWriter")
            .field("closed", &self.tx.is_closed())
            .field("stats", &self.stats)
            .finish()
    }
}

impl PersistenceWriter {
    /// Spawns the writer task on the current tokio runtime.
    pub fn spawn(storage: Arc<dyn Storage>, policy: WriterPolicy) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WriterStats::default());
        let handle = tokio::spawn(run(storage, policy, rx, Arc::clone(&stats)));
        (Self { tx, stats }, handle)
    }

    /// Queues a write. Never waits for storage.
    pub fn enqueue(&self, op: WriteOp) -> Result<(), StorageError> {
        self.tx
            .send(Command::Write(op))
            .map_err(|_| StorageError::WriterClosed)
    }

    /// Waits until every write queued before this call has been attempted.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| StorageError::WriterClosed)?;
        ack_rx.await.map_err(|_| StorageError::WriterClosed)
    }

    /// Drains the queue and stops the task. Later writes fail with
    /// [`StorageError::WriterClosed`].
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown(ack_tx))
            .map_err(|_| StorageError::WriterClosed)?;
        ack_rx.await.map_err(|_| StorageError::WriterClosed)
    }

    /// Write counters.
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }
}

async fn run(
    storage: Arc<dyn Storage>,
    policy: WriterPolicy,
    mut rx: mpsc::UnboundedReceiver<Command>,
    stats: Arc<WriterStats>,
) {
    let mut shutdown_acks = Vec::new();
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write(op) => apply_with_retry(&storage, policy, op, &stats).await,
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown(ack) => {
                debug!("persistence writer draining for shutdown");
                rx.close();
                shutdown_acks.push(ack);
            }
        }
    }
    for ack in shutdown_acks {
        let _ = ack.send(());
    }
    debug!(
        applied = stats.applied(),
        dropped = stats.dropped(),
        "persistence writer stopped"
    );
}

async fn apply_with_retry(
    storage: &Arc<dyn Storage>,
    policy: WriterPolicy,
    op: WriteOp,
    stats: &WriterStats,
) {
    let mut attempt = 0u32;
    loop {
        let storage = Arc::clone(storage);
        let job = op.clone();
        let result = tokio::task::spawn_blocking(move || job.apply(storage.as_ref())).await;

        match result {
            Ok(Ok(())) => {
                stats.applied.fetch_add(1, Ordering::SeqCst);
                trace!(op = %op.label(), "durable write applied");
                return;
            }
            Ok(Err(e)) if attempt < policy.retries => {
                attempt += 1;
                stats.retried.fetch_add(1, Ordering::SeqCst);
                warn!(op = %op.label(), attempt, error = %e, "durable write failed, retrying");
                tokio::time::sleep(policy.backoff).await;
            }
            Ok(Err(e)) => {
                stats.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(op = %op.label(), error = %e, "durable write dropped after retries");
                return;
            }
            Err(e) => {
                stats.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(op = %op.label(), error = %e, "durable write task panicked");
                return;
            }
        }
    }
}

//! Group cache and coordinator.
//!
//! [`GroupCache`] is the single authoritative copy of group membership for
//! the lifetime of the process. Every mutation runs under one async mutex
//! and, while still holding it:
//!
//! 1. updates the in-memory maps,
//! 2. queues the matching durable writes on the [`PersistenceWriter`],
//! 3. publishes a fresh [`GroupsSnapshot`] on the watch channel,
//! 4. sends the fine-grained [`GroupEvent`]s on the broadcast channel.
//!
//! Nothing is awaited between the first and last step, so no observer can
//! see a half-applied change, and events arrive in mutation order. Reads are
//! served from the latest snapshot and never wait on the mutex or storage.

use futures::Stream;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, trace, warn};

use crate::error::{GroupError, StorageError};
use crate::model::{Group, GroupId, TabId};
use crate::persistence::{GroupRecord, PersistenceWriter, Storage, WriteOp};
use crate::session::SessionLookup;

#[cfg(test)]
mod tests;

mod events;
mod ops;
mod state;

pub use events::{GroupEvent, GroupsSnapshot};

use state::{Changes, GroupState};

/// Default capacity for the group event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Thread-safe group coordinator. Clones share the same state and channels.
#[derive(Clone)]
pub struct GroupCache {
    state: Arc<Mutex<GroupState>>,
    sessions: Arc<dyn SessionLookup>,
    writer: PersistenceWriter,
    snapshot_tx: Arc<watch::Sender<Arc<GroupsSnapshot>>>,
    event_tx: broadcast::Sender<GroupEvent>,
}

impl std::fmt::Debug for GroupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("GroupCache")
            .field("revision", &snapshot.revision())
            .field("group_count", &snapshot.len())
            .field("subscriber_count", &self.event_tx.receiver_count())
            .field("writer", &self.writer)
            .finish()
    }
}

impl GroupCache {
    /// Creates an empty cache.
    ///
    /// `event_capacity` is the number of events buffered per subscriber
    /// before it starts lagging.
    pub fn new(
        sessions: Arc<dyn SessionLookup>,
        writer: PersistenceWriter,
        event_capacity: usize,
    ) -> Self {
        Self::with_state(GroupState::default(), sessions, writer, event_capacity)
    }

    /// Cold-start: reads `storage` once and rebuilds the maps from it.
    ///
    /// Groups without members are skipped. A tab stored under several groups
    /// stays with the oldest one, and the repaired groups are written back.
    pub async fn load(
        storage: Arc<dyn Storage>,
        sessions: Arc<dyn SessionLookup>,
        writer: PersistenceWriter,
        event_capacity: usize,
    ) -> Result<Self, StorageError> {
        let tables = tokio::task::spawn_blocking(move || storage.load_groups())
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        let (state, discarded) = GroupState::from_groups(tables.active_groups());
        let cache = Self::with_state(state, sessions, writer, event_capacity);

        if discarded > 0 {
            warn!(discarded, "dropped duplicate memberships found in storage");
            let snapshot = cache.snapshot();
            for group in snapshot.groups() {
                cache.enqueue(WriteOp::SaveGroup {
                    record: GroupRecord::from_group(group),
                    members: group.tab_ids.clone(),
                });
            }
        }

        info!(groups = cache.group_count(), "group cache loaded");
        Ok(cache)
    }

    fn with_state(
        state: GroupState,
        sessions: Arc<dyn SessionLookup>,
        writer: PersistenceWriter,
        event_capacity: usize,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(state.snapshot()));
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Arc::new(Mutex::new(state)),
            sessions,
            writer,
            snapshot_tx: Arc::new(snapshot_tx),
            event_tx,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<GroupsSnapshot> {
        Arc::clone(&self.snapshot_tx.borrow())
    }

    /// Group containing `tab_id`, if any.
    pub fn group_for_tab(&self, tab_id: &TabId) -> Option<Group> {
        self.snapshot().group_for_tab(tab_id).cloned()
    }

    /// Group with the given id, if it exists.
    pub fn group(&self, group_id: GroupId) -> Option<Group> {
        self.snapshot().group(group_id).cloned()
    }

    /// Every group, ordered by creation time.
    pub fn all_groups(&self) -> Vec<Group> {
        self.snapshot().groups().to_vec()
    }

    /// Returns `true` if `tab_id` belongs to a group.
    pub fn is_tab_grouped(&self, tab_id: &TabId) -> bool {
        self.snapshot().is_tab_grouped(tab_id)
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.snapshot().len()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Coarse channel. The current snapshot is visible immediately and every
    /// structural change replaces it.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<GroupsSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Fine-grained channel. Only events sent after subscribing are received.
    pub fn subscribe_events(&self) -> broadcast::Receiver<GroupEvent> {
        self.event_tx.subscribe()
    }

    /// Event channel as a stream. Lagged gaps are logged and skipped; the
    /// stream ends when the cache is dropped.
    pub fn event_stream(&self) -> impl Stream<Item = GroupEvent> + Send + 'static {
        futures::stream::unfold(self.event_tx.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) => return Some((event, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "group event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Number of live event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    /// Waits until every durable write queued so far has been attempted.
    pub async fn flush(&self) -> Result<(), GroupError> {
        self.writer.flush().await.map_err(GroupError::from)
    }

    // -----------------------------------------------------------------------
    // Mutation plumbing
    // -----------------------------------------------------------------------

    /// Runs `f` under the state lock and commits its changes before releasing it.
    pub(crate) async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut GroupState) -> Result<(T, Changes), GroupError>,
    ) -> Result<T, GroupError> {
        let mut state = self.state.lock().await;
        let (value, changes) = f(&mut state)?;
        if !changes.is_empty() {
            self.commit(&mut state, changes);
        }
        Ok(value)
    }

    fn commit(&self, state: &mut GroupState, changes: Changes) {
        for group_id in &changes.touched {
            let op = match state.group(group_id) {
                Some(group) => WriteOp::SaveGroup {
                    record: GroupRecord::from_group(group),
                    members: group.tab_ids.clone(),
                },
                None => WriteOp::DeleteGroup(*group_id),
            };
            self.enqueue(op);
        }

        let snapshot = Arc::new(state.publish_snapshot());
        trace!(revision = snapshot.revision(), "group snapshot published");
        self.snapshot_tx.send_replace(snapshot);

        for event in changes.events {
            match self.event_tx.send(event) {
                Ok(count) => trace!("group event sent to {} subscribers", count),
                Err(_) => trace!("no subscribers for group event"),
            }
        }
    }

    fn enqueue(&self, op: WriteOp) {
        if let Err(e) = self.writer.enqueue(op) {
            warn!(error = %e, "durable write not queued; memory remains authoritative");
        }
    }

    pub(crate) fn sessions(&self) -> &dyn SessionLookup {
        self.sessions.as_ref()
    }
}

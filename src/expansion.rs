//! Which groups are shown expanded.
//!
//! A plain reactive set: absence means collapsed. Every change publishes the
//! whole set on a watch channel and queues it for storage.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::GroupId;
use crate::persistence::{PersistenceWriter, Storage, WriteOp, EXPANSION_BLOB_KEY};

/// Set of expanded group ids.
pub type ExpandedSet = BTreeSet<GroupId>;

/// Reactive, persisted expansion state. Clones share the same set.
#[derive(Debug, Clone)]
pub struct GroupExpansionStore {
    tx: Arc<watch::Sender<Arc<ExpandedSet>>>,
    writer: Option<PersistenceWriter>,
}

impl GroupExpansionStore {
    /// Creates a store with every group collapsed.
    pub fn new(writer: Option<PersistenceWriter>) -> Self {
        Self::from_set(ExpandedSet::new(), writer)
    }

    fn from_set(set: ExpandedSet, writer: Option<PersistenceWriter>) -> Self {
        let (tx, _) = watch::channel(Arc::new(set));
        Self {
            tx: Arc::new(tx),
            writer,
        }
    }

    /// Restores the set saved by a previous run. A corrupt blob is logged
    /// and treated as empty.
    pub async fn load(
        storage: Arc<dyn Storage>,
        writer: Option<PersistenceWriter>,
    ) -> Result<Self, StorageError> {
        let raw = tokio::task::spawn_blocking(move || storage.load_blob(EXPANSION_BLOB_KEY))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        let set = match raw {
            Some(json) => decode_blob(&json).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable expansion state");
                ExpandedSet::new()
            }),
            None => ExpandedSet::new(),
        };
        Ok(Self::from_set(set, writer))
    }

    pub fn is_group_expanded(&self, group_id: GroupId) -> bool {
        self.tx.borrow().contains(&group_id)
    }

    /// Current set.
    pub fn expanded(&self) -> Arc<ExpandedSet> {
        Arc::clone(&self.tx.borrow())
    }

    /// Receiver that sees the current set immediately and every later one.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ExpandedSet>> {
        self.tx.subscribe()
    }

    /// Flips a group's state and returns the new one.
    pub fn toggle(&self, group_id: GroupId) -> bool {
        let mut expanded = false;
        self.update(|set| {
            expanded = !set.remove(&group_id);
            if expanded {
                set.insert(group_id);
            }
            true
        });
        expanded
    }

    pub fn expand(&self, group_id: GroupId) {
        self.update(|set| set.insert(group_id));
    }

    pub fn collapse(&self, group_id: GroupId) {
        self.update(|set| set.remove(&group_id));
    }

    /// Expands every group in `group_ids`.
    pub fn expand_all(&self, group_ids: impl IntoIterator<Item = GroupId>) {
        let ids: Vec<GroupId> = group_ids.into_iter().collect();
        self.update(|set| {
            let before = set.len();
            set.extend(ids);
            set.len() != before
        });
    }

    pub fn collapse_all(&self) {
        self.update(|set| {
            let changed = !set.is_empty();
            set.clear();
            changed
        });
    }

    /// Replaces the whole set.
    pub fn set_expanded(&self, group_ids: impl IntoIterator<Item = GroupId>) {
        let next: ExpandedSet = group_ids.into_iter().collect();
        self.update(|set| {
            if *set == next {
                return false;
            }
            *set = next;
            true
        });
    }

    /// Drops ids not in `existing`. Returns how many were dropped.
    pub fn prune(&self, existing: impl IntoIterator<Item = GroupId>) -> usize {
        let existing: BTreeSet<GroupId> = existing.into_iter().collect();
        let mut dropped = 0;
        self.update(|set| {
            let before = set.len();
            set.retain(|id| existing.contains(id));
            dropped = before - set.len();
            dropped > 0
        });
        if dropped > 0 {
            debug!(dropped, "pruned expansion entries of deleted groups");
        }
        dropped
    }

    /// Applies `f`; publishes and persists only when it reports a change.
    fn update(&self, f: impl FnOnce(&mut ExpandedSet) -> bool) {
        self.tx.send_if_modified(|current| {
            let mut next = ExpandedSet::clone(current);
            if !f(&mut next) {
                return false;
            }
            self.persist(&next);
            *current = Arc::new(next);
            true
        });
    }

    fn persist(&self, set: &ExpandedSet) {
        let Some(writer) = &self.writer else {
            return;
        };
        let value = match serde_json::to_string(set) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to serialize expansion state");
                return;
            }
        };
        if let Err(e) = writer.enqueue(WriteOp::SaveBlob {
            key: EXPANSION_BLOB_KEY.to_string(),
            value,
        }) {
            warn!(error = %e, "expansion state write not queued");
        }
    }
}

/// Decodes a stored expansion blob.
pub fn decode_blob(json: &str) -> Result<ExpandedSet, serde_json::Error> {
    serde_json::from_str(json)
}

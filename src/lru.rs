//! Most-recently-selected tab order for swipe navigation.
//!
//! Independent of grouping. The queue is most-recent-first, holds each tab
//! once, and is persisted as a single blob after every change.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::model::TabId;
use crate::persistence::{PersistenceWriter, Storage, WriteOp, LRU_BLOB_KEY};

/// Stored form of the queue. Unknown fields are ignored and missing ones
/// default, so new fields can be added freely.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LruBlob {
    #[serde(default)]
    tabs: Vec<TabId>,
}

#[derive(Debug, Default)]
struct LruInner {
    order: VecDeque<TabId>,
    gesture_marks: HashSet<TabId>,
}

/// Thread-safe LRU navigation queue. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct LruQueue {
    inner: Arc<RwLock<LruInner>>,
    writer: Option<PersistenceWriter>,
}

impl LruQueue {
    /// Creates an empty queue. Without a writer nothing is persisted.
    pub fn new(writer: Option<PersistenceWriter>) -> Self {
        Self::from_order(Vec::new(), writer)
    }

    fn from_order(tabs: Vec<TabId>, writer: Option<PersistenceWriter>) -> Self {
        let mut seen = HashSet::new();
        let order = tabs.into_iter().filter(|t| seen.insert(t.clone())).collect();
        Self {
            inner: Arc::new(RwLock::new(LruInner {
                order,
                gesture_marks: HashSet::new(),
            })),
            writer,
        }
    }

    /// Restores the queue saved by a previous run.
    ///
    /// A corrupt blob is logged and replaced by an empty queue.
    pub async fn load(
        storage: Arc<dyn Storage>,
        writer: Option<PersistenceWriter>,
    ) -> Result<Self, StorageError> {
        let raw = tokio::task::spawn_blocking(move || storage.load_blob(LRU_BLOB_KEY))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        let tabs = match raw {
            Some(json) => match serde_json::from_str::<LruBlob>(&json) {
                Ok(blob) => blob.tabs,
                Err(e) => {
                    warn!(error = %e, "discarding unreadable LRU queue");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        debug!(entries = tabs.len(), "LRU queue loaded");
        Ok(Self::from_order(tabs, writer))
    }

    /// Moves `tab_id` to the front, unless the selection was marked as
    /// gesture-driven, in which case the mark is consumed and nothing moves.
    pub async fn on_tab_selected(&self, tab_id: &TabId) {
        let mut inner = self.inner.write().await;
        if inner.gesture_marks.remove(tab_id) {
            debug!(tab_id = %tab_id, "gesture selection left LRU order untouched");
            return;
        }
        if inner.order.front() == Some(tab_id) {
            return;
        }
        inner.order.retain(|t| t != tab_id);
        inner.order.push_front(tab_id.clone());
        self.persist(&inner);
    }

    /// Marks the next selection of `tab_id` as coming from gesture navigation.
    pub async fn mark_as_gesture_navigation(&self, tab_id: &TabId) {
        let mut inner = self.inner.write().await;
        inner.gesture_marks.insert(tab_id.clone());
    }

    /// Removes `tab_id` from the queue.
    pub async fn on_tab_closed(&self, tab_id: &TabId) {
        let mut inner = self.inner.write().await;
        inner.gesture_marks.remove(tab_id);
        let before = inner.order.len();
        inner.order.retain(|t| t != tab_id);
        if inner.order.len() != before {
            self.persist(&inner);
        }
    }

    /// Reconciles with the tabs that exist after session restore.
    ///
    /// Tracked tabs that survive keep their relative order; tabs that exist
    /// but were not tracked are appended at the tail as the oldest entries,
    /// in the order given.
    pub async fn synchronize(&self, current: impl IntoIterator<Item = TabId>) {
        let current: Vec<TabId> = current.into_iter().collect();
        let present: HashSet<&TabId> = current.iter().collect();

        let mut inner = self.inner.write().await;
        let before: Vec<TabId> = inner.order.iter().cloned().collect();
        inner.order.retain(|t| present.contains(t));
        let mut tracked: HashSet<TabId> = inner.order.iter().cloned().collect();
        for tab in &current {
            if tracked.insert(tab.clone()) {
                inner.order.push_back(tab.clone());
            }
        }
        inner.gesture_marks.retain(|t| present.contains(t));

        if inner.order.iter().ne(before.iter()) {
            info!(entries = inner.order.len(), "LRU queue synchronized");
            self.persist(&inner);
        }
    }

    /// Tab `offset` places away from `current` (positive is older).
    ///
    /// Past the oldest entry wraps to the newest; before the newest wraps to
    /// the oldest. `None` if `current` is not tracked.
    pub async fn tab_at_offset(&self, current: &TabId, offset: isize) -> Option<TabId> {
        let inner = self.inner.read().await;
        let index = inner.order.iter().position(|t| t == current)?;
        // Overflow only happens far past either end, so it wraps the same way.
        let target = (index as isize).checked_add(offset);
        match target {
            Some(target) if target >= 0 && (target as usize) < inner.order.len() => {
                inner.order.get(target as usize).cloned()
            }
            Some(target) if target < 0 => inner.order.back().cloned(),
            None if offset < 0 => inner.order.back().cloned(),
            _ => inner.order.front().cloned(),
        }
    }

    pub async fn most_recent(&self) -> Option<TabId> {
        self.inner.read().await.order.front().cloned()
    }

    /// The whole queue, most recent first.
    pub async fn entries(&self) -> Vec<TabId> {
        self.inner.read().await.order.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.order.is_empty()
    }

    /// Queues the current order for storage. Called with the write lock held
    /// so saved blobs follow mutation order.
    fn persist(&self, inner: &LruInner) {
        let Some(writer) = &self.writer else {
            return;
        };
        let blob = LruBlob {
            tabs: inner.order.iter().cloned().collect(),
        };
        let value = match serde_json::to_string(&blob) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "failed to serialize LRU queue");
                return;
            }
        };
        if let Err(e) = writer.enqueue(WriteOp::SaveBlob {
            key: LRU_BLOB_KEY.to_string(),
            value,
        }) {
            warn!(error = %e, "LRU queue write not queued");
        }
    }
}

/// Decodes a stored queue blob, for tools that read storage directly.
pub fn decode_blob(json: &str) -> Result<Vec<TabId>, serde_json::Error> {
    serde_json::from_str::<LruBlob>(json).map(|blob| blob.tabs)
}

//! Tests for the GroupCache module.
//!
//! Tests are organized into categories:
//! - `basic`: Queries, rename/recolor, delete
//! - `create`: create_group semantics
//! - `membership`: add/remove/move/reorder and cascading deletion
//! - `merge`: merge_groups
//! - `privacy`: Privacy and profile isolation
//! - `concurrent`: Serialized mutations from many tasks
//! - `subscriber`: Snapshot and event channels
//! - `persistence`: Durable writes and cold-start load

mod create;
mod membership;
mod privacy;

use super::GroupCache;
use crate::model::{PrivacyScope, TabId};
use crate::persistence::{MemoryStorage, PersistenceWriter, Storage, WriterPolicy};
use crate::session::{SessionRegistry, TabSession};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Cache wired to in-memory storage and a session registry.
pub(super) struct Harness {
    pub(super) cache: GroupCache,
    pub(super) storage: Arc<MemoryStorage>,
    pub(super) sessions: Arc<SessionRegistry>,
    pub(super) writer: PersistenceWriter,
}

impl Harness {
    /// Registers a normal tab.
    pub(super) fn open(&self, id: &str, url: &str) -> TabId {
        self.open_with(id, url, PrivacyScope::normal())
    }

    /// Registers a tab with an explicit scope.
    pub(super) fn open_with(&self, id: &str, url: &str, scope: PrivacyScope) -> TabId {
        self.sessions.upsert(TabSession::new(id, url).with_scope(scope));
        TabId::from(id)
    }
}

pub(super) fn fast_policy() -> WriterPolicy {
    WriterPolicy {
        retries: 2,
        backoff: Duration::from_millis(1),
    }
}

/// Must be called from inside a tokio runtime.
pub(super) fn harness() -> Harness {
    harness_with(Arc::new(MemoryStorage::new()))
}

pub(super) fn harness_with(storage: Arc<MemoryStorage>) -> Harness {
    let sessions = Arc::new(SessionRegistry::new());
    let (writer, _handle) =
        PersistenceWriter::spawn(Arc::clone(&storage) as Arc<dyn Storage>, fast_policy());
    let cache = GroupCache::new(sessions.clone(), writer.clone(), 64);
    Harness {
        cache,
        storage,
        sessions,
        writer,
    }
}

pub(super) fn tab(id: &str) -> TabId {
    TabId::from(id)
}

/// Asserts exclusivity and the absence of empty groups.
pub(super) fn assert_invariants(cache: &GroupCache) {
    let mut seen = HashSet::new();
    for group in cache.all_groups() {
        assert!(!group.tab_ids.is_empty(), "empty group {} visible", group.id);
        for member in &group.tab_ids {
            assert!(seen.insert(member.clone()), "tab {} in two groups", member);
            assert_eq!(
                cache.group_for_tab(member).map(|g| g.id),
                Some(group.id),
                "index disagrees for {}",
                member
            );
        }
    }
}

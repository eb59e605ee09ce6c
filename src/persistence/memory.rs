//! In-process storage used by tests and ephemeral engines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{GroupRecord, Storage, StoredGroups};
use crate::error::StorageError;
use crate::model::{GroupId, TabId};

/// [`Storage`] kept entirely in memory.
///
/// Can be switched offline or told to fail the next N writes to exercise
/// the writer's retry path.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: Mutex<StoredGroups>,
    blobs: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
    failures_remaining: AtomicU32,
    writes: AtomicUsize,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with tables, as if from a previous run.
    pub fn with_tables(tables: StoredGroups) -> Self {
        Self {
            tables: Mutex::new(tables),
            ..Self::default()
        }
    }

    /// While offline every call fails with [`StorageError::Offline`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of writes that were applied successfully.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of the current tables.
    pub fn tables(&self) -> StoredGroups {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_read(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Offline);
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StorageError> {
        self.check_read()?;
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StorageError::Offline);
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn load_groups(&self) -> Result<StoredGroups, StorageError> {
        self.check_read()?;
        Ok(self.tables())
    }

    fn save_group(&self, record: &GroupRecord, members: &[TabId]) -> Result<(), StorageError> {
        self.check_write()?;
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert_group(record, members);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_group(&self, id: GroupId) -> Result<(), StorageError> {
        self.check_write()?;
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .soft_delete(id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_blob(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_read()?;
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(key).cloned())
    }

    fn save_blob(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_write()?;
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

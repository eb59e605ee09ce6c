//! Durable storage for groups, memberships and state blobs.
//!
//! The group cache is the only writer of record. Storage is read once at
//! cold start; afterwards every write goes through the single
//! [`PersistenceWriter`] task so writes land in the order they were made.

use crate::error::StorageError;
use crate::model::{GroupId, TabId};

mod json_file;
mod memory;
mod migrations;
mod records;
mod writer;

pub use json_file::JsonFileStorage;
pub use memory::MemoryStorage;
pub use migrations::CURRENT_SCHEMA_VERSION;
pub use records::{GroupRecord, MembershipRecord, StoredGroups};
pub use writer::{PersistenceWriter, WriteOp, WriterPolicy, WriterStats};

/// Blob key for the LRU navigation queue.
pub const LRU_BLOB_KEY: &str = "lru_queue";

/// Blob key for the expanded group set.
pub const EXPANSION_BLOB_KEY: &str = "expanded_groups";

/// Read/write contract of the durable store. No business logic lives here.
///
/// Implementations are synchronous; the writer task calls them from
/// `spawn_blocking`.
pub trait Storage: Send + Sync {
    /// Reads both group tables.
    fn load_groups(&self) -> Result<StoredGroups, StorageError>;

    /// Upserts a group row and replaces its ordered membership.
    fn save_group(&self, record: &GroupRecord, members: &[TabId]) -> Result<(), StorageError>;

    /// Soft-deletes a group and drops its memberships.
    fn delete_group(&self, id: GroupId) -> Result<(), StorageError>;

    /// Reads a serialized blob by fixed key.
    fn load_blob(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces a serialized blob.
    fn save_blob(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

//! JSON file storage: `groups.json` plus one `<key>.json` per blob.
//!
//! Every write replaces the whole file using the temp-file, fsync, rename
//! sequence, so a crash leaves either the old or the new content on disk.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::migrations::{self, Migration, CURRENT_SCHEMA_VERSION};
use super::{GroupRecord, MembershipRecord, Storage, StoredGroups};
use crate::config::xdg;
use crate::error::StorageError;
use crate::model::{GroupId, TabId};

const GROUPS_FILE: &str = "groups.json";

/// On-disk layout of `groups.json`.
#[derive(Debug, Serialize, Deserialize)]
struct GroupsDocument {
    schema_version: u32,
    #[serde(default)]
    groups: Vec<GroupRecord>,
    #[serde(default)]
    memberships: Vec<MembershipRecord>,
}

/// File-backed [`Storage`].
///
/// The tables are read once on [`open`](JsonFileStorage::open) and kept in
/// memory; each write updates them and rewrites the file.
#[derive(Debug)]
pub struct JsonFileStorage {
    dir: PathBuf,
    tables: Mutex<StoredGroups>,
    read_only: bool,
}

impl JsonFileStorage {
    /// Opens (or initializes) storage in `dir`.
    ///
    /// Applies pending schema patches and purges soft-deleted rows, writing
    /// the result back when anything changed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        xdg::ensure_dir(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;

        let (tables, dirty) = load_tables(&dir)?;
        let storage = Self {
            dir,
            tables: Mutex::new(tables),
            read_only: false,
        };
        if dirty {
            storage.persist_tables(&storage.lock_tables())?;
        }
        Ok(storage)
    }

    /// Opens storage for inspection.
    ///
    /// Nothing on disk is touched: a missing directory reads as empty,
    /// upgrades and purges stay in memory, and every write fails with
    /// [`StorageError::ReadOnly`].
    pub fn open_read_only(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        let (tables, _) = load_tables(&dir)?;
        Ok(Self {
            dir,
            tables: Mutex::new(tables),
            read_only: true,
        })
    }

    /// Directory this storage writes to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, StoredGroups> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_writable(&self) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnly(self.dir.clone()));
        }
        Ok(())
    }

    fn persist_tables(&self, tables: &StoredGroups) -> Result<(), StorageError> {
        self.ensure_writable()?;
        let doc = GroupsDocument {
            schema_version: CURRENT_SCHEMA_VERSION,
            groups: tables.groups.clone(),
            memberships: tables.memberships.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        write_atomic(&self.dir.join(GROUPS_FILE), json.as_bytes())
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::Serialize(format!("invalid blob key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

/// Reads `groups.json` from `dir` and purges soft-deleted rows. The flag
/// reports whether the in-memory tables differ from the file.
fn load_tables(dir: &Path) -> Result<(StoredGroups, bool), StorageError> {
    let path = dir.join(GROUPS_FILE);
    let (mut tables, mut dirty) = if path.exists() {
        read_groups_file(&path)?
    } else {
        (StoredGroups::default(), false)
    };

    let purged = tables.purge_inactive();
    if purged > 0 {
        tracing::debug!(purged, "purged soft-deleted group rows");
        dirty = true;
    }
    Ok((tables, dirty))
}

/// Reads and migrates `groups.json`. The flag reports whether it was upgraded.
fn read_groups_file(path: &Path) -> Result<(StoredGroups, bool), StorageError> {
    let content = fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |message: String| StorageError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let mut value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?;
    let upgraded = match migrations::migrate(&mut value).map_err(parse_err)? {
        Migration::UpToDate => false,
        Migration::Upgraded { from } => {
            tracing::info!(
                from,
                to = CURRENT_SCHEMA_VERSION,
                "upgraded group storage schema"
            );
            true
        }
        Migration::TooNew { found } => {
            return Err(StorageError::UnsupportedSchema {
                found,
                supported: CURRENT_SCHEMA_VERSION,
            })
        }
    };

    let doc: GroupsDocument =
        serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?;
    Ok((
        StoredGroups {
            groups: doc.groups,
            memberships: doc.memberships,
        },
        upgraded,
    ))
}

/// Writes `bytes` to `path` via a sibling temp file, fsync and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, bytes).map_err(io_err)?;
    let file = fs::File::open(&temp_path).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;
    Ok(())
}

impl Storage for JsonFileStorage {
    fn load_groups(&self) -> Result<StoredGroups, StorageError> {
        Ok(self.lock_tables().clone())
    }

    fn save_group(&self, record: &GroupRecord, members: &[TabId]) -> Result<(), StorageError> {
        let mut tables = self.lock_tables();
        let mut next = tables.clone();
        next.upsert_group(record, members);
        self.persist_tables(&next)?;
        *tables = next;
        Ok(())
    }

    fn delete_group(&self, id: GroupId) -> Result<(), StorageError> {
        let mut tables = self.lock_tables();
        let mut next = tables.clone();
        if !next.soft_delete(id) {
            return Ok(());
        }
        self.persist_tables(&next)?;
        *tables = next;
        Ok(())
    }

    fn load_blob(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.blob_path(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn save_blob(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_writable()?;
        let path = self.blob_path(key)?;
        write_atomic(&path, value.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupColor, PrivacyScope};
    use chrono::Utc;

    fn record(name: &str) -> GroupRecord {
        GroupRecord {
            id: GroupId::new_random(),
            name: name.to_string(),
            color: GroupColor::Purple,
            created_at: Utc::now(),
            active: true,
            scope: PrivacyScope::normal(),
        }
    }

    #[test]
    fn open_empty_dir_has_no_groups() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = JsonFileStorage::open(dir.path()).expect("open");
        assert!(storage.load_groups().expect("load").active_groups().is_empty());
    }

    #[test]
    fn saved_group_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let row = record("research");
        {
            let storage = JsonFileStorage::open(dir.path()).expect("open");
            storage
                .save_group(&row, &[TabId::from("t1"), TabId::from("t2")])
                .expect("save");
        }

        let reopened = JsonFileStorage::open(dir.path()).expect("reopen");
        let groups = reopened.load_groups().expect("load").active_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "research");
        assert_eq!(groups[0].tab_ids, vec![TabId::from("t1"), TabId::from("t2")]);
    }

    #[test]
    fn deleted_group_is_purged_on_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let row = record("temp");
        {
            let storage = JsonFileStorage::open(dir.path()).expect("open");
            storage.save_group(&row, &[TabId::from("t1")]).expect("save");
            storage.delete_group(row.id).expect("delete");
            assert_eq!(storage.load_groups().expect("load").groups.len(), 1);
        }

        let reopened = JsonFileStorage::open(dir.path()).expect("reopen");
        assert!(reopened.load_groups().expect("load").groups.is_empty());
    }

    #[test]
    fn no_temp_file_left_after_write() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = JsonFileStorage::open(dir.path()).expect("open");
        storage.save_group(&record("x"), &[TabId::from("t1")]).expect("save");
        assert!(dir.path().join(GROUPS_FILE).exists());
        assert!(!dir.path().join("groups.json.tmp").exists());
    }

    #[test]
    fn v1_file_is_upgraded_on_open() {
        let dir = tempfile::tempdir().expect("temp dir");
        let v1 = r#"{"groups":[{"id":"6f1c8a7e-0000-4000-8000-0000000000aa","name":"old","color":"cyan","created_at":"2024-03-01T10:00:00Z","tab_ids":["a","b"]}]}"#;
        fs::write(dir.path().join(GROUPS_FILE), v1).expect("write v1");

        let storage = JsonFileStorage::open(dir.path()).expect("open v1");
        let groups = storage.load_groups().expect("load").active_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tab_ids, vec![TabId::from("a"), TabId::from("b")]);

        let rewritten = fs::read_to_string(dir.path().join(GROUPS_FILE)).expect("read");
        assert!(rewritten.contains("\"schema_version\": 2"));
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join(GROUPS_FILE), r#"{"schema_version": 7}"#).expect("write");
        match JsonFileStorage::open(dir.path()) {
            Err(StorageError::UnsupportedSchema { found, .. }) => assert_eq!(found, 7),
            other => panic!("expected UnsupportedSchema, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join(GROUPS_FILE), "{not json").expect("write");
        assert!(matches!(
            JsonFileStorage::open(dir.path()),
            Err(StorageError::Parse { .. })
        ));
    }

    #[test]
    fn blobs_roundtrip_and_reject_bad_keys() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = JsonFileStorage::open(dir.path()).expect("open");
        assert_eq!(storage.load_blob("lru_queue").expect("read"), None);
        storage.save_blob("lru_queue", "[\"t1\",\"t2\"]").expect("write");
        assert_eq!(
            storage.load_blob("lru_queue").expect("read").as_deref(),
            Some("[\"t1\",\"t2\"]")
        );
        assert!(storage.save_blob("../escape", "x").is_err());
    }

    #[test]
    fn read_only_open_leaves_v1_file_untouched() {
        let dir = tempfile::tempdir().expect("temp dir");
        let v1 = r#"{"groups":[{"id":"6f1c8a7e-0000-4000-8000-0000000000bb","name":"old","color":"red","created_at":"2024-03-01T10:00:00Z","tab_ids":["a"]}]}"#;
        let path = dir.path().join(GROUPS_FILE);
        fs::write(&path, v1).expect("write v1");

        let storage = JsonFileStorage::open_read_only(dir.path()).expect("open read-only");
        let groups = storage.load_groups().expect("load").active_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "old");

        assert_eq!(fs::read_to_string(&path).expect("read"), v1);
    }

    #[test]
    fn read_only_open_keeps_deleted_rows_on_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let row = record("temp");
        {
            let storage = JsonFileStorage::open(dir.path()).expect("open");
            storage.save_group(&row, &[TabId::from("t1")]).expect("save");
            storage.delete_group(row.id).expect("delete");
        }
        let before = fs::read_to_string(dir.path().join(GROUPS_FILE)).expect("read");

        let storage = JsonFileStorage::open_read_only(dir.path()).expect("open read-only");
        assert!(storage.load_groups().expect("load").groups.is_empty());
        let after = fs::read_to_string(dir.path().join(GROUPS_FILE)).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn read_only_open_of_missing_dir_is_empty_and_not_created() {
        let parent = tempfile::tempdir().expect("temp dir");
        let dir = parent.path().join("never-created");

        let storage = JsonFileStorage::open_read_only(&dir).expect("open read-only");
        assert!(storage.load_groups().expect("load").groups.is_empty());
        assert_eq!(storage.load_blob("lru_queue").expect("read"), None);
        assert!(!dir.exists());
    }

    #[test]
    fn read_only_storage_rejects_writes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = JsonFileStorage::open_read_only(dir.path()).expect("open read-only");
        let row = record("x");

        assert!(matches!(
            storage.save_group(&row, &[TabId::from("t1")]),
            Err(StorageError::ReadOnly(_))
        ));
        assert!(matches!(
            storage.save_blob("lru_queue", "{}"),
            Err(StorageError::ReadOnly(_))
        ));
        assert!(storage.load_groups().expect("load").groups.is_empty());
        assert!(!dir.path().join(GROUPS_FILE).exists());
    }
}

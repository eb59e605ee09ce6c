//! Error types for group operations, storage and engine startup.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::error::ConfigError;

/// Errors surfaced by group cache operations.
///
/// `NotFound` and `IncompatiblePrivacy` are expected conditions; the cache
/// state is left unchanged when they occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    /// A caller-supplied argument is unusable (e.g. an empty tab set).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced group or tab does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation would mix tabs across a privacy or profile boundary.
    #[error("Incompatible privacy scope for {subject}: expected {expected}, got {actual}")]
    IncompatiblePrivacy {
        /// Tab or group that was rejected.
        subject: String,
        /// Scope required by the target.
        expected: String,
        /// Scope of the rejected subject.
        actual: String,
    },

    /// The durable store could not be reached.
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

/// Errors raised by [`Storage`](crate::persistence::Storage) implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing a file failed.
    #[error("Storage I/O failed at {path}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Stored content could not be parsed.
    #[error("Corrupt storage file {path}: {message}")]
    Parse {
        /// File involved.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A value could not be serialized.
    #[error("Failed to serialize storage record: {0}")]
    Serialize(String),

    /// The file was written by a newer schema than this build understands.
    #[error("Unsupported storage schema version {found} (supported up to {supported})")]
    UnsupportedSchema {
        /// Version found on disk.
        found: u32,
        /// Latest version this build can read.
        supported: u32,
    },

    /// Storage was opened for inspection and refuses writes.
    #[error("Storage at {0} is open read-only")]
    ReadOnly(PathBuf),

    /// Storage was switched off (used to simulate outages).
    #[error("Storage offline")]
    Offline,

    /// The writer task has stopped and accepts no more work.
    #[error("Persistence writer closed")]
    WriterClosed,

    /// A blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<StorageError> for GroupError {
    fn from(err: StorageError) -> Self {
        GroupError::PersistenceUnavailable(err.to_string())
    }
}

/// Errors raised while starting the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded or was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The durable store could not be opened or read.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

//! TOML configuration schema types for tab-islands.
//!
//! All structs derive `Deserialize` and `Serialize` with defaults via
//! `#[serde(default)]`, so a partial (or empty) file is always valid.
//!
//! Duration fields use human-readable strings (e.g. `"200ms"`, `"1s"`)
//! parsed by the `humantime` crate at the call site.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::error::ConfigError;
use crate::config::xdg;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration encompassing all sections.
///
/// ```toml
/// [storage]
/// [heuristic]
/// [events]
/// [log]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Durable store location and write policy.
    pub storage: StorageConfig,
    /// Auto-grouping behavior.
    pub heuristic: HeuristicConfig,
    /// Notification channel sizing.
    pub events: EventsConfig,
    /// Logging verbosity.
    pub log: LogConfig,
}

impl Config {
    /// Checks fields that only fail at use time (durations, capacities).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.retry_backoff()?;
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "events.channel_capacity".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Durable store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `groups.json` and the state blobs.
    /// Empty string means the platform data directory.
    pub data_dir: String,
    /// How many times a failed durable write is retried before it is dropped.
    pub write_retries: u32,
    /// Pause between write retries (e.g. `"200ms"`).
    pub retry_backoff: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            write_retries: 3,
            retry_backoff: "200ms".to_string(),
        }
    }
}

impl StorageConfig {
    /// Resolves the data directory, expanding `~` and falling back to XDG.
    pub fn data_dir_path(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            xdg::data_dir()
        } else {
            xdg::expand_tilde(&self.data_dir)
        }
    }

    /// Parses `retry_backoff` into a [`Duration`].
    pub fn retry_backoff(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.retry_backoff).map_err(|e| ConfigError::InvalidValue {
            field: "storage.retry_backoff".to_string(),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Heuristic
// ---------------------------------------------------------------------------

/// Auto-grouping configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Whether newly opened tabs are grouped automatically.
    pub enabled: bool,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Notification channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the discrete group event channel. Slow subscribers that
    /// fall further behind than this observe a lag and resync from the
    /// snapshot channel.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Logging configuration. `ISLANDS_LOG` overrides `level` when set.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Logging verbosity.
    pub level: LogLevel,
}

/// Log verbosity levels (kebab-case in TOML).
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages (default).
    #[default]
    Info,
    /// Debug-level detail.
    Debug,
    /// Full trace output.
    Trace,
}

impl LogLevel {
    /// Returns the `EnvFilter` directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

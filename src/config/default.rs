//! Default configuration template and file creation utilities.
//!
//! Provides a commented TOML template that matches `Config::default()`
//! and functions to write it to the XDG config path or a chosen file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::error::ConfigError;
use crate::config::xdg;

// ---------------------------------------------------------------------------
// Default TOML template
// ---------------------------------------------------------------------------

/// A commented TOML template with all default values.
///
/// Every value here must match `Config::default()` from `schema.rs`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# tab-islands configuration
#
# All values shown below are the built-in defaults.
#
# Location: $XDG_CONFIG_HOME/tab-islands/config.toml

# ==============================================================================
# Storage
# ==============================================================================

[storage]

# Directory holding groups.json and the LRU / expansion state files.
# Empty string means the platform data directory
# ($XDG_DATA_HOME/tab-islands or ~/.local/share/tab-islands).
data_dir = ""

# Number of retries for a durable write that failed.
# The in-memory state is never rolled back; after the last retry the write
# is dropped and a warning is logged.
write_retries = 3

# Pause between retries, as a human-readable duration.
# Examples: "100ms", "200ms", "1s"
retry_backoff = "200ms"

# ==============================================================================
# Auto-grouping
# ==============================================================================

[heuristic]

# Group tabs opened from another tab on a different site automatically.
enabled = true

# ==============================================================================
# Events
# ==============================================================================

[events]

# Buffered group events per subscriber before it is reported as lagging.
channel_capacity = 256

# ==============================================================================
# Logging
# ==============================================================================

[log]

# Options: "error", "warn", "info", "debug", "trace"
# The ISLANDS_LOG environment variable takes precedence when set.
level = "info"
"#;

// ---------------------------------------------------------------------------
// File creation
// ---------------------------------------------------------------------------

/// Writes the default template to the XDG config path and returns it.
///
/// See [`create_default_config_at`] for the overwrite rules.
pub fn create_default_config(force: bool) -> Result<PathBuf, ConfigError> {
    let path = xdg::config_path();
    create_default_config_at(&path, force)?;
    Ok(path)
}

/// Writes the default template to `path`.
///
/// An existing file is an `AlreadyExists` error unless `force` is set, in
/// which case it is first moved aside to `<name>.backup`. A missing parent
/// directory is created owner-only; an existing one is left as is.
pub fn create_default_config_at(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() {
        if !force {
            return Err(ConfigError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let backup = backup_path(path);
        fs::rename(path, &backup).map_err(write_error(&backup))?;
        tracing::info!(backup = %backup.display(), "existing config backed up");
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            xdg::ensure_dir(parent).map_err(write_error(path))?;
        }
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(write_error(path))?;
    restrict_permissions(path)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

/// Makes the file owner read/write only.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(write_error(path))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::WriteError {
        path: path.to_path_buf(),
        source,
    }
}

//! Logging initialization.
//!
//! Configures the `tracing` subscriber with level filtering via the
//! `ISLANDS_LOG` environment variable, falling back to the configured level.
//!
//! ```bash
//! ISLANDS_LOG=debug islands groups
//! ISLANDS_LOG=tab_islands::heuristic=trace,warn islands groups
//! ```

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::schema::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV_VAR: &str = "ISLANDS_LOG";

/// Builds the filter from `ISLANDS_LOG`, or from `fallback` when unset or invalid.
pub fn env_filter(fallback: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(fallback.as_directive()))
}

/// Initialize the tracing subscriber, writing to stderr.
///
/// A host that already installed a global subscriber keeps its own; the
/// second installation attempt is ignored.
pub fn init(fallback: LogLevel) {
    let _ = fmt()
        .with_env_filter(env_filter(fallback))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_filter_parses_valid_directives() {
        for d in ["info", "debug", "warn", "error", "trace"] {
            assert!(EnvFilter::try_new(d).is_ok(), "failed to parse directive: {}", d);
        }
    }

    #[test]
    fn env_filter_parses_module_directive() {
        assert!(EnvFilter::try_new("tab_islands::groups=debug,warn").is_ok());
    }

    #[test]
    fn init_twice_does_not_panic() {
        init(LogLevel::Warn);
        init(LogLevel::Debug);
    }
}

//! Tab Islands library
//!
//! Tab grouping and session navigation engine for a mobile browser. Tabs are
//! owned by an external session store; this crate keeps the side tables
//! around them:
//!
//! - [`groups`]: the authoritative group membership cache ("islands") with
//!   snapshot and event channels for UI layers.
//! - [`heuristic`]: automatic grouping of tabs opened from another site.
//! - [`lru`]: most-recently-selected order for swipe navigation.
//! - [`expansion`]: which groups are shown expanded.
//! - [`middleware`]: the hook that feeds session lifecycle actions in.
//! - [`persistence`]: durable storage and the single ordered writer task.
//!
//! [`engine::Engine`] wires everything together for one profile.

/// Configuration file schema, loading and XDG paths.
pub mod config;

/// Composition root.
pub mod engine;

/// Error types.
pub mod error;

/// Group expansion state.
pub mod expansion;

/// Group cache and coordinator.
pub mod groups;

/// Auto-grouping heuristic.
pub mod heuristic;

/// Tracing subscriber setup.
pub mod logging;

/// LRU navigation queue.
pub mod lru;

/// Session store action hook.
pub mod middleware;

/// Core value types.
pub mod model;

/// Durable storage.
pub mod persistence;

/// External session store boundary.
pub mod session;

pub use engine::{Engine, EngineOptions};
pub use error::{EngineError, GroupError, StorageError};
pub use groups::{GroupCache, GroupEvent, GroupsSnapshot};
pub use model::{Group, GroupColor, GroupId, PrivacyScope, TabId};
pub use session::{SessionAction, SessionLookup, SessionRegistry, TabSession};

//! Boundary types for the external session store.
//!
//! The browser engine owns tab identity, URL, title and privacy. This engine
//! only reads them through [`SessionLookup`] and observes lifecycle actions
//! as [`SessionAction`] values.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::model::{PrivacyScope, TabId};

/// Read-only view of one browsing session ("tab").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSession {
    /// Opaque identifier.
    pub id: TabId,
    /// Current URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Privacy mode and profile tag.
    pub scope: PrivacyScope,
    /// Tab this one was opened from, if any.
    pub parent_id: Option<TabId>,
    /// Last time the tab was accessed.
    pub last_access: DateTime<Utc>,
}

impl TabSession {
    /// Creates a normal-mode session with no parent.
    pub fn new(id: impl Into<TabId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: String::new(),
            scope: PrivacyScope::normal(),
            parent_id: None,
            last_access: Utc::now(),
        }
    }

    /// Sets the privacy scope.
    pub fn with_scope(mut self, scope: PrivacyScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the parent tab.
    pub fn with_parent(mut self, parent: impl Into<TabId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }
}

/// Lookup into the external session store.
pub trait SessionLookup: Send + Sync {
    /// Returns the session with the given id, if it still exists.
    fn session(&self, id: &TabId) -> Option<TabSession>;

    /// Returns a snapshot of every current session.
    fn sessions(&self) -> Vec<TabSession>;

    /// Privacy scope of a tab. Tabs the store does not know are treated as
    /// normal and unassigned.
    fn scope_of(&self, id: &TabId) -> PrivacyScope {
        self.session(id).map(|s| s.scope).unwrap_or_default()
    }
}

/// Lifecycle actions flowing through the session store's dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// A tab was created. `previously_selected` is the tab that was selected
    /// immediately before the new tab appeared.
    TabAdded {
        /// The new tab.
        tab: TabSession,
        /// Selection at the time of creation.
        previously_selected: Option<TabId>,
    },
    /// A tab was explicitly selected.
    TabSelected {
        /// Selected tab.
        tab_id: TabId,
    },
    /// A tab committed a navigation to a new URL.
    TabUrlChanged {
        /// Navigated tab.
        tab_id: TabId,
        /// New URL.
        url: String,
    },
    /// A tab was closed.
    TabClosed {
        /// Closed tab.
        tab_id: TabId,
    },
    /// Session restore finished; `tab_ids` are the tabs that exist now.
    RestoreComplete {
        /// Surviving tabs.
        tab_ids: Vec<TabId>,
    },
}

/// Simple in-memory [`SessionLookup`] for hosts and tests that do not have
/// their own session store handle.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<TabId, TabSession>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a session.
    pub fn upsert(&self, session: TabSession) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(session.id.clone(), session);
    }

    /// Updates the URL of a known session. Returns `false` if unknown.
    pub fn set_url(&self, id: &TabId, url: impl Into<String>) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(id) {
            Some(session) => {
                session.url = url.into();
                session.last_access = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Removes a session, returning it if present.
    pub fn remove(&self, id: &TabId) -> Option<TabSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(id)
    }
}

impl SessionLookup for SessionRegistry {
    fn session(&self, id: &TabId) -> Option<TabSession> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned()
    }

    fn sessions(&self) -> Vec<TabSession> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_upsert_and_lookup() {
        let registry = SessionRegistry::new();
        registry.upsert(TabSession::new("t1", "https://a.com"));
        let found = registry.session(&TabId::from("t1")).expect("t1 registered");
        assert_eq!(found.url, "https://a.com");
        assert_eq!(registry.sessions().len(), 1);
    }

    #[test]
    fn unknown_tab_scope_defaults_to_normal() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.scope_of(&TabId::from("ghost")), PrivacyScope::normal());
    }

    #[test]
    fn scope_of_reports_private_tabs() {
        let registry = SessionRegistry::new();
        registry.upsert(TabSession::new("p1", "https://a.com").with_scope(PrivacyScope::private()));
        assert!(registry.scope_of(&TabId::from("p1")).private);
    }

    #[test]
    fn set_url_on_unknown_tab_returns_false() {
        let registry = SessionRegistry::new();
        assert!(!registry.set_url(&TabId::from("nope"), "https://b.com"));
    }

    #[test]
    fn remove_drops_session() {
        let registry = SessionRegistry::new();
        registry.upsert(TabSession::new("t1", "https://a.com").with_parent("t0"));
        let removed = registry.remove(&TabId::from("t1")).expect("removed");
        assert_eq!(removed.parent_id, Some(TabId::from("t0")));
        assert!(registry.session(&TabId::from("t1")).is_none());
    }
}

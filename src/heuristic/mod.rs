//! Auto-grouping of newly opened tabs.
//!
//! [`decide`] is the pure rule set. [`AutoGrouper`] feeds it facts from the
//! session store and the group cache, remembers which (tab, url) pairs it has
//! already seen, and applies the decision through the cache.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::error::GroupError;
use crate::groups::GroupCache;
use crate::model::{GroupId, PrivacyScope, TabId};
use crate::session::SessionLookup;

mod decision;
mod domain;

pub use decision::{decide, DeclineReason, GroupingDecision, TabFacts};
pub use domain::{is_internal_url, Domain};

/// A tab to evaluate, as reported by the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub tab_id: TabId,
    pub url: String,
    pub scope: PrivacyScope,
}

/// What an evaluation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingOutcome {
    Declined(DeclineReason),
    /// The tab was added to an existing group.
    Joined(GroupId),
    /// A new group was created for the source and the tab.
    Created(GroupId),
    /// The cache refused the change.
    Rejected(GroupError),
}

/// Stateful wrapper around [`decide`].
pub struct AutoGrouper {
    cache: GroupCache,
    sessions: Arc<dyn SessionLookup>,
    enabled: AtomicBool,
    evaluated: Mutex<HashSet<(TabId, String)>>,
}

impl std::fmt::Debug for AutoGrouper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoGrouper")
            .field("enabled", &self.is_enabled())
            .field("evaluated", &self.evaluated_count())
            .finish()
    }
}

impl AutoGrouper {
    pub fn new(cache: GroupCache, sessions: Arc<dyn SessionLookup>, enabled: bool) -> Self {
        Self {
            cache,
            sessions,
            enabled: AtomicBool::new(enabled),
            evaluated: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "auto-grouping toggled");
    }

    /// Evaluates `candidate`, opened while `source` was selected.
    ///
    /// Each (tab, url) pair is acted on at most once; later calls with the
    /// same pair decline with [`DeclineReason::AlreadyEvaluated`].
    pub async fn evaluate(&self, candidate: &Candidate, source: Option<&TabId>) -> GroupingOutcome {
        if !self.is_enabled() {
            return GroupingOutcome::Declined(DeclineReason::Disabled);
        }
        if !self.mark_evaluated(&candidate.tab_id, &candidate.url) {
            debug!(tab_id = %candidate.tab_id, "auto-grouping skipped, pair already evaluated");
            return GroupingOutcome::Declined(DeclineReason::AlreadyEvaluated);
        }

        // Group ids are filled in by the cache under its lock.
        let new_tab = TabFacts {
            tab_id: candidate.tab_id.clone(),
            url: candidate.url.clone(),
            scope: candidate.scope.clone(),
            group_id: None,
        };
        let source_facts = source.and_then(|id| self.facts_for(id));

        match self.cache.apply_grouping(new_tab, source_facts).await {
            Ok(outcome) => {
                match &outcome {
                    GroupingOutcome::Declined(reason) => {
                        debug!(tab_id = %candidate.tab_id, %reason, "auto-grouping declined");
                    }
                    GroupingOutcome::Joined(group_id) => {
                        debug!(tab_id = %candidate.tab_id, group_id = %group_id, "auto-grouping joined group");
                    }
                    GroupingOutcome::Created(group_id) => {
                        debug!(tab_id = %candidate.tab_id, group_id = %group_id, "auto-grouping created group");
                    }
                    GroupingOutcome::Rejected(_) => {}
                }
                outcome
            }
            Err(e) => rejected(&candidate.tab_id, e),
        }
    }

    /// Drops every recorded pair for `tab_id`.
    pub fn forget_tab(&self, tab_id: &TabId) {
        let mut evaluated = self.evaluated.lock().unwrap_or_else(PoisonError::into_inner);
        evaluated.retain(|(tab, _)| tab != tab_id);
    }

    /// Number of recorded (tab, url) pairs.
    pub fn evaluated_count(&self) -> usize {
        self.evaluated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Records the pair; returns `false` if it was already recorded.
    fn mark_evaluated(&self, tab_id: &TabId, url: &str) -> bool {
        let mut evaluated = self.evaluated.lock().unwrap_or_else(PoisonError::into_inner);
        evaluated.insert((tab_id.clone(), url.to_string()))
    }

    fn facts_for(&self, tab_id: &TabId) -> Option<TabFacts> {
        let session = self.sessions.session(tab_id)?;
        Some(TabFacts {
            tab_id: session.id,
            url: session.url,
            scope: session.scope,
            group_id: None,
        })
    }
}

fn rejected(tab_id: &TabId, err: GroupError) -> GroupingOutcome {
    debug!(tab_id = %tab_id, error = %err, "auto-grouping rejected by cache");
    GroupingOutcome::Rejected(err)
}

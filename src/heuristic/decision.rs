//! Pure auto-grouping decision.

use std::fmt;

use super::domain::{is_internal_url, Domain};
use crate::model::{GroupId, PrivacyScope, TabId};

/// What the decision needs to know about one tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabFacts {
    pub tab_id: TabId,
    pub url: String,
    pub scope: PrivacyScope,
    /// Group the tab currently belongs to.
    pub group_id: Option<GroupId>,
}

/// Why the heuristic left a tab alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    /// No source tab, or the source is the tab itself.
    NoSource,
    InternalUrl,
    PrivacyMismatch,
    UnknownDomain,
    /// The new tab is already in a group.
    AlreadyGrouped,
    /// Same site and the source is not grouped.
    SameDomainUngrouped,
    /// This (tab, url) pair was already evaluated.
    AlreadyEvaluated,
    Disabled,
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeclineReason::NoSource => "no source tab",
            DeclineReason::InternalUrl => "internal url",
            DeclineReason::PrivacyMismatch => "privacy mismatch",
            DeclineReason::UnknownDomain => "unknown domain",
            DeclineReason::AlreadyGrouped => "already grouped",
            DeclineReason::SameDomainUngrouped => "same domain, source ungrouped",
            DeclineReason::AlreadyEvaluated => "already evaluated",
            DeclineReason::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Action chosen for a new tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingDecision {
    Decline(DeclineReason),
    /// Add the new tab to this existing group.
    JoinGroup(GroupId),
    /// Create a group of exactly these two tabs.
    CreateGroup { source: TabId, new: TabId },
}

/// Decides what to do with `new_tab`, opened while `source` was selected.
///
/// Rules apply in order: no source, internal URL, privacy mismatch and
/// unknown domain all decline. Tabs on the same site only join an existing
/// group of the source. Tabs on a different site join the source's group or
/// form a new group with it.
pub fn decide(new_tab: &TabFacts, source: Option<&TabFacts>) -> GroupingDecision {
    let Some(source) = source.filter(|s| s.tab_id != new_tab.tab_id) else {
        return GroupingDecision::Decline(DeclineReason::NoSource);
    };
    if is_internal_url(&new_tab.url) {
        return GroupingDecision::Decline(DeclineReason::InternalUrl);
    }
    if !source.scope.is_compatible(&new_tab.scope) {
        return GroupingDecision::Decline(DeclineReason::PrivacyMismatch);
    }

    let new_domain = Domain::of(&new_tab.url);
    let source_domain = Domain::of(&source.url);
    if new_domain.is_unknown() || source_domain.is_unknown() {
        return GroupingDecision::Decline(DeclineReason::UnknownDomain);
    }
    if new_tab.group_id.is_some() {
        return GroupingDecision::Decline(DeclineReason::AlreadyGrouped);
    }

    match (new_domain == source_domain, source.group_id) {
        (_, Some(group_id)) => GroupingDecision::JoinGroup(group_id),
        (true, None) => GroupingDecision::Decline(DeclineReason::SameDomainUngrouped),
        (false, None) => GroupingDecision::CreateGroup {
            source: source.tab_id.clone(),
            new: new_tab.tab_id.clone(),
        },
    }
}

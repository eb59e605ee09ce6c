//! Notification types published by the group cache.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{Group, GroupColor, GroupId, TabId};

/// Fine-grained change notification, delivered in mutation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    GroupCreated {
        group: Group,
    },
    TabAddedToGroup {
        tab_id: TabId,
        group_id: GroupId,
        position: usize,
    },
    TabRemovedFromGroup {
        tab_id: TabId,
        group_id: GroupId,
    },
    GroupRenamed {
        group_id: GroupId,
        name: String,
    },
    GroupColorChanged {
        group_id: GroupId,
        color: GroupColor,
    },
    GroupDeleted {
        group_id: GroupId,
    },
    /// `source_id` no longer exists; `moved` were appended to `target_id`.
    GroupsMerged {
        source_id: GroupId,
        target_id: GroupId,
        moved: Vec<TabId>,
    },
    TabMovedBetweenGroups {
        tab_id: TabId,
        from_id: GroupId,
        to_id: GroupId,
        position: usize,
    },
    TabReordered {
        tab_id: TabId,
        group_id: GroupId,
        position: usize,
    },
}

impl GroupEvent {
    /// Group whose existence ended with this event, if any.
    pub fn removed_group(&self) -> Option<GroupId> {
        match self {
            GroupEvent::GroupDeleted { group_id } => Some(*group_id),
            GroupEvent::GroupsMerged { source_id, .. } => Some(*source_id),
            _ => None,
        }
    }
}

/// Immutable view of every group at one revision.
///
/// Published through a watch channel; the latest value is replayed to new
/// subscribers and backs the synchronous query functions.
#[derive(Debug, Clone, Default)]
pub struct GroupsSnapshot {
    revision: u64,
    groups: Vec<Group>,
    by_id: HashMap<GroupId, usize>,
    by_tab: HashMap<TabId, GroupId>,
}

impl GroupsSnapshot {
    /// Builds a snapshot from groups already in display order.
    pub(crate) fn new(revision: u64, groups: Vec<Group>) -> Self {
        let by_id = groups.iter().enumerate().map(|(i, g)| (g.id, i)).collect();
        let by_tab = groups
            .iter()
            .flat_map(|g| g.tab_ids.iter().map(move |t| (t.clone(), g.id)))
            .collect();
        Self {
            revision,
            groups,
            by_id,
            by_tab,
        }
    }

    /// Monotonic revision, bumped by every structural change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// All groups ordered by creation time.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Looks up a group by id.
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.by_id.get(&id).map(|&i| &self.groups[i])
    }

    /// Group containing `tab_id`, if any.
    pub fn group_for_tab(&self, tab_id: &TabId) -> Option<&Group> {
        self.by_tab.get(tab_id).and_then(|id| self.group(*id))
    }

    /// Returns `true` if `tab_id` belongs to a group.
    pub fn is_tab_grouped(&self, tab_id: &TabId) -> bool {
        self.by_tab.contains_key(tab_id)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` when there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

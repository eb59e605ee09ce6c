//! Table rows for the durable group store and the shared table logic used
//! by every [`Storage`](super::Storage) implementation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::{Group, GroupColor, GroupId, PrivacyScope, TabId};

/// One row of the groups table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    pub color: GroupColor,
    pub created_at: DateTime<Utc>,
    /// Soft-delete flag; inactive rows are never surfaced by reads.
    pub active: bool,
    #[serde(default)]
    pub scope: PrivacyScope,
}

impl GroupRecord {
    /// Builds the active row for a live group.
    pub fn from_group(group: &Group) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            color: group.color,
            created_at: group.created_at,
            active: true,
            scope: group.scope.clone(),
        }
    }
}

/// One row of the membership table. `tab_id` is unique among rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub tab_id: TabId,
    pub group_id: GroupId,
    pub position: u32,
}

/// Both tables as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGroups {
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    #[serde(default)]
    pub memberships: Vec<MembershipRecord>,
}

impl StoredGroups {
    /// Upserts a group row and replaces its ordered membership.
    ///
    /// Membership rows for the same tabs under other groups are removed so
    /// a tab id never appears twice.
    pub fn upsert_group(&mut self, record: &GroupRecord, members: &[TabId]) {
        match self.groups.iter_mut().find(|g| g.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => self.groups.push(record.clone()),
        }

        let incoming: HashSet<&TabId> = members.iter().collect();
        self.memberships
            .retain(|m| m.group_id != record.id && !incoming.contains(&m.tab_id));
        self.memberships
            .extend(members.iter().enumerate().map(|(position, tab_id)| {
                MembershipRecord {
                    tab_id: tab_id.clone(),
                    group_id: record.id,
                    position: position as u32,
                }
            }));
    }

    /// Marks a group inactive and drops its memberships.
    ///
    /// Returns `false` if no row exists for `id`.
    pub fn soft_delete(&mut self, id: GroupId) -> bool {
        self.memberships.retain(|m| m.group_id != id);
        match self.groups.iter_mut().find(|g| g.id == id) {
            Some(row) => {
                row.active = false;
                true
            }
            None => false,
        }
    }

    /// Drops inactive rows and their stray memberships.
    pub fn purge_inactive(&mut self) -> usize {
        let before = self.groups.len();
        self.groups.retain(|g| g.active);
        let live: HashSet<GroupId> = self.groups.iter().map(|g| g.id).collect();
        self.memberships.retain(|m| live.contains(&m.group_id));
        before - self.groups.len()
    }

    /// Assembles the active groups that still have members, in creation order.
    pub fn active_groups(&self) -> Vec<Group> {
        let mut groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|row| row.active)
            .filter_map(|row| {
                let mut rows: Vec<&MembershipRecord> = self
                    .memberships
                    .iter()
                    .filter(|m| m.group_id == row.id)
                    .collect();
                if rows.is_empty() {
                    return None;
                }
                rows.sort_by_key(|m| m.position);
                Some(Group {
                    id: row.id,
                    name: row.name.clone(),
                    color: row.color,
                    created_at: row.created_at,
                    tab_ids: rows.into_iter().map(|m| m.tab_id.clone()).collect(),
                    scope: row.scope.clone(),
                })
            })
            .collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        groups
    }
}

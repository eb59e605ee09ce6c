//! In-memory group maps and the mutations applied to them.
//!
//! Every mutation validates first and only then touches the maps, so a
//! rejected call leaves the state exactly as it was. Successful mutations
//! report the events to publish and the groups whose durable rows changed.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use super::events::{GroupEvent, GroupsSnapshot};
use crate::error::GroupError;
use crate::model::{Group, GroupColor, GroupId, PrivacyScope, TabId};

/// Result of a successful mutation.
#[derive(Debug, Default)]
pub(crate) struct Changes {
    /// Events in the order they happened.
    pub(crate) events: Vec<GroupEvent>,
    /// Groups whose stored row must be rewritten or deleted, in order.
    pub(crate) touched: Vec<GroupId>,
}

impl Changes {
    fn touch(&mut self, id: GroupId) {
        if !self.touched.contains(&id) {
            self.touched.push(id);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty() && self.touched.is_empty()
    }
}

/// Authoritative group maps.
///
/// A group's `scope` is always the narrowing of its members' scopes, so it
/// widens again when the member that narrowed it leaves.
#[derive(Debug, Default)]
pub(crate) struct GroupState {
    groups: HashMap<GroupId, Group>,
    tab_index: HashMap<TabId, GroupId>,
    member_scopes: HashMap<TabId, PrivacyScope>,
    revision: u64,
}

impl GroupState {
    /// Rebuilds state from stored groups.
    ///
    /// Empty groups are skipped and a tab claimed by several groups stays
    /// with the first one seen. Storage keeps no per-tab scope, so every
    /// restored member takes its group's stored scope. Returns the state and
    /// the number of memberships that had to be discarded.
    pub(crate) fn from_groups(groups: Vec<Group>) -> (Self, usize) {
        let mut state = Self::default();
        let mut discarded = 0;
        for mut group in groups {
            let mut seen = HashSet::new();
            let before = group.tab_ids.len();
            group
                .tab_ids
                .retain(|t| !state.tab_index.contains_key(t) && seen.insert(t.clone()));
            discarded += before - group.tab_ids.len();
            if group.tab_ids.is_empty() {
                continue;
            }
            for tab in &group.tab_ids {
                state.tab_index.insert(tab.clone(), group.id);
                state.member_scopes.insert(tab.clone(), group.scope.clone());
            }
            state.groups.insert(group.id, group);
        }
        (state, discarded)
    }

    pub(crate) fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.get(id)
    }

    pub(crate) fn group_of(&self, tab_id: &TabId) -> Option<GroupId> {
        self.tab_index.get(tab_id).copied()
    }

    pub(crate) fn grouped_tabs(&self) -> impl Iterator<Item = &TabId> {
        self.tab_index.keys()
    }

    /// Bumps the revision and builds the snapshot for publication.
    pub(crate) fn publish_snapshot(&mut self) -> GroupsSnapshot {
        self.revision += 1;
        self.snapshot()
    }

    pub(crate) fn snapshot(&self) -> GroupsSnapshot {
        let mut groups: Vec<Group> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        GroupsSnapshot::new(self.revision, groups)
    }

    /// Palette color used by the fewest live groups, first in palette order on ties.
    pub(crate) fn least_used_color(&self) -> GroupColor {
        let mut counts: HashMap<GroupColor, usize> = HashMap::new();
        for group in self.groups.values() {
            *counts.entry(group.color).or_default() += 1;
        }
        GroupColor::PALETTE
            .into_iter()
            .min_by_key(|c| counts.get(c).copied().unwrap_or(0))
            .unwrap_or(GroupColor::Blue)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub(crate) fn create_group(
        &mut self,
        tab_ids: Vec<(TabId, PrivacyScope)>,
        name: Option<String>,
        color: Option<GroupColor>,
        now: DateTime<Utc>,
    ) -> Result<(Group, Changes), GroupError> {
        let mut seen = HashSet::new();
        let members: Vec<(TabId, PrivacyScope)> = tab_ids
            .into_iter()
            .filter(|(tab, _)| seen.insert(tab.clone()))
            .collect();
        let Some((_, first_scope)) = members.first() else {
            return Err(GroupError::InvalidArgument(
                "create_group requires at least one tab".to_string(),
            ));
        };

        let mut scope = first_scope.clone();
        for (tab, tab_scope) in &members[1..] {
            if !scope.is_compatible(tab_scope) {
                return Err(incompatible(format!("tab {}", tab), &scope, tab_scope));
            }
            scope = scope.narrowed(tab_scope);
        }

        let mut changes = Changes::default();
        for (tab, _) in &members {
            self.detach(tab, &mut changes);
        }

        let color = color.unwrap_or_else(|| self.least_used_color());
        let mut tab_ids = Vec::with_capacity(members.len());
        for (tab, tab_scope) in members {
            self.member_scopes.insert(tab.clone(), tab_scope);
            tab_ids.push(tab);
        }
        let group = Group {
            id: GroupId::new_random(),
            name: name.unwrap_or_default(),
            color,
            created_at: now,
            tab_ids,
            scope,
        };
        for tab in &group.tab_ids {
            self.tab_index.insert(tab.clone(), group.id);
        }
        self.groups.insert(group.id, group.clone());
        changes.touch(group.id);
        changes.events.push(GroupEvent::GroupCreated {
            group: group.clone(),
        });
        Ok((group, changes))
    }

    /// Adds `tab_id` to `group_id`. Returns empty changes if already a member.
    pub(crate) fn add_tab(
        &mut self,
        tab_id: &TabId,
        tab_scope: &PrivacyScope,
        group_id: GroupId,
        position: Option<usize>,
    ) -> Result<Changes, GroupError> {
        let target = self
            .groups
            .get(&group_id)
            .ok_or_else(|| not_found_group(group_id))?;
        if target.contains(tab_id) {
            return Ok(Changes::default());
        }
        if !target.scope.is_compatible(tab_scope) {
            return Err(incompatible(format!("tab {}", tab_id), &target.scope, tab_scope));
        }

        let mut changes = Changes::default();
        self.detach(tab_id, &mut changes);
        let position = self.insert_member(tab_id, tab_scope, group_id, position);
        changes.touch(group_id);
        changes.events.push(GroupEvent::TabAddedToGroup {
            tab_id: tab_id.clone(),
            group_id,
            position,
        });
        Ok(changes)
    }

    pub(crate) fn remove_tab(&mut self, tab_id: &TabId) -> Result<Changes, GroupError> {
        if !self.tab_index.contains_key(tab_id) {
            return Err(GroupError::NotFound(format!("tab {} is not grouped", tab_id)));
        }
        let mut changes = Changes::default();
        self.detach(tab_id, &mut changes);
        Ok(changes)
    }

    pub(crate) fn rename(&mut self, group_id: GroupId, name: String) -> Result<Changes, GroupError> {
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| not_found_group(group_id))?;
        group.name = name.clone();
        let mut changes = Changes::default();
        changes.touch(group_id);
        changes
            .events
            .push(GroupEvent::GroupRenamed { group_id, name });
        Ok(changes)
    }

    pub(crate) fn recolor(
        &mut self,
        group_id: GroupId,
        color: GroupColor,
    ) -> Result<Changes, GroupError> {
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| not_found_group(group_id))?;
        group.color = color;
        let mut changes = Changes::default();
        changes.touch(group_id);
        changes
            .events
            .push(GroupEvent::GroupColorChanged { group_id, color });
        Ok(changes)
    }

    pub(crate) fn delete_group(&mut self, group_id: GroupId) -> Result<Changes, GroupError> {
        let group = self
            .groups
            .remove(&group_id)
            .ok_or_else(|| not_found_group(group_id))?;
        for tab in &group.tab_ids {
            self.tab_index.remove(tab);
            self.member_scopes.remove(tab);
        }
        let mut changes = Changes::default();
        changes.touch(group_id);
        changes.events.push(GroupEvent::GroupDeleted { group_id });
        Ok(changes)
    }

    pub(crate) fn merge(
        &mut self,
        source_id: GroupId,
        target_id: GroupId,
    ) -> Result<Changes, GroupError> {
        if source_id == target_id {
            return Err(GroupError::InvalidArgument(format!(
                "cannot merge group {} into itself",
                source_id
            )));
        }
        let source_scope = self
            .groups
            .get(&source_id)
            .ok_or_else(|| not_found_group(source_id))?
            .scope
            .clone();
        let target = self
            .groups
            .get(&target_id)
            .ok_or_else(|| not_found_group(target_id))?;
        if !target.scope.is_compatible(&source_scope) {
            return Err(incompatible(
                format!("group {}", source_id),
                &target.scope,
                &source_scope,
            ));
        }

        let source = self
            .groups
            .remove(&source_id)
            .ok_or_else(|| not_found_group(source_id))?;
        let target = self
            .groups
            .get_mut(&target_id)
            .ok_or_else(|| not_found_group(target_id))?;
        let mut moved = Vec::with_capacity(source.tab_ids.len());
        for tab in source.tab_ids {
            if !target.tab_ids.contains(&tab) {
                target.tab_ids.push(tab.clone());
                moved.push(tab);
            }
        }
        target.scope = target.scope.narrowed(&source_scope);
        for tab in &moved {
            self.tab_index.insert(tab.clone(), target_id);
        }

        let mut changes = Changes::default();
        changes.touch(source_id);
        changes.touch(target_id);
        changes.events.push(GroupEvent::GroupsMerged {
            source_id,
            target_id,
            moved,
        });
        Ok(changes)
    }

    pub(crate) fn move_tab(
        &mut self,
        tab_id: &TabId,
        tab_scope: &PrivacyScope,
        from_id: GroupId,
        to_id: GroupId,
        position: Option<usize>,
    ) -> Result<Changes, GroupError> {
        if from_id == to_id {
            return Err(GroupError::InvalidArgument(
                "source and destination group are the same".to_string(),
            ));
        }
        if self.group_of(tab_id) != Some(from_id) {
            return Err(GroupError::NotFound(format!(
                "tab {} is not in group {}",
                tab_id, from_id
            )));
        }
        let target = self
            .groups
            .get(&to_id)
            .ok_or_else(|| not_found_group(to_id))?;
        if !target.scope.is_compatible(tab_scope) {
            return Err(incompatible(format!("tab {}", tab_id), &target.scope, tab_scope));
        }

        let mut changes = Changes::default();
        let emptied = self.take_member(tab_id, from_id);
        changes.touch(from_id);
        let position = self.insert_member(tab_id, tab_scope, to_id, position);
        changes.touch(to_id);
        changes.events.push(GroupEvent::TabMovedBetweenGroups {
            tab_id: tab_id.clone(),
            from_id,
            to_id,
            position,
        });
        if emptied {
            changes
                .events
                .push(GroupEvent::GroupDeleted { group_id: from_id });
        }
        Ok(changes)
    }

    pub(crate) fn reorder_tab(
        &mut self,
        tab_id: &TabId,
        position: usize,
    ) -> Result<Changes, GroupError> {
        let group_id = self
            .group_of(tab_id)
            .ok_or_else(|| GroupError::NotFound(format!("tab {} is not grouped", tab_id)))?;
        let group = self
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| not_found_group(group_id))?;
        let Some(current) = group.tab_ids.iter().position(|t| t == tab_id) else {
            return Err(GroupError::NotFound(format!("tab {} is not grouped", tab_id)));
        };
        let tab = group.tab_ids.remove(current);
        let position = position.min(group.tab_ids.len());
        group.tab_ids.insert(position, tab);

        let mut changes = Changes::default();
        if position != current {
            changes.touch(group_id);
            changes.events.push(GroupEvent::TabReordered {
                tab_id: tab_id.clone(),
                group_id,
                position,
            });
        }
        Ok(changes)
    }

    /// Drops memberships of tabs not in `existing`.
    pub(crate) fn retain_tabs(&mut self, existing: &HashSet<TabId>) -> Changes {
        let stale: Vec<TabId> = self
            .tab_index
            .keys()
            .filter(|t| !existing.contains(*t))
            .cloned()
            .collect();
        let mut changes = Changes::default();
        for tab in stale {
            self.detach(&tab, &mut changes);
        }
        changes
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Removes `tab_id` from its group, deleting the group if it empties.
    fn detach(&mut self, tab_id: &TabId, changes: &mut Changes) {
        let Some(group_id) = self.group_of(tab_id) else {
            return;
        };
        let emptied = self.take_member(tab_id, group_id);
        changes.touch(group_id);
        changes.events.push(GroupEvent::TabRemovedFromGroup {
            tab_id: tab_id.clone(),
            group_id,
        });
        if emptied {
            changes.events.push(GroupEvent::GroupDeleted { group_id });
        }
    }

    /// Removes the membership; returns `true` if the group was deleted.
    fn take_member(&mut self, tab_id: &TabId, group_id: GroupId) -> bool {
        self.tab_index.remove(tab_id);
        self.member_scopes.remove(tab_id);
        let Some(group) = self.groups.get_mut(&group_id) else {
            return false;
        };
        group.tab_ids.retain(|t| t != tab_id);
        if group.tab_ids.is_empty() {
            self.groups.remove(&group_id);
            return true;
        }
        self.rescope(group_id);
        false
    }

    /// Recomputes a group's scope from the scopes of its current members.
    fn rescope(&mut self, group_id: GroupId) {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return;
        };
        let mut scopes = group
            .tab_ids
            .iter()
            .filter_map(|tab| self.member_scopes.get(tab));
        let Some(first) = scopes.next() else {
            return;
        };
        group.scope = scopes.fold(first.clone(), |acc, scope| acc.narrowed(scope));
    }

    /// Inserts at the clamped position and returns the position used.
    fn insert_member(
        &mut self,
        tab_id: &TabId,
        tab_scope: &PrivacyScope,
        group_id: GroupId,
        position: Option<usize>,
    ) -> usize {
        let Some(group) = self.groups.get_mut(&group_id) else {
            return 0;
        };
        let position = position.unwrap_or(group.tab_ids.len()).min(group.tab_ids.len());
        group.tab_ids.insert(position, tab_id.clone());
        group.scope = group.scope.narrowed(tab_scope);
        self.tab_index.insert(tab_id.clone(), group_id);
        self.member_scopes.insert(tab_id.clone(), tab_scope.clone());
        position
    }
}

fn not_found_group(id: GroupId) -> GroupError {
    GroupError::NotFound(format!("group {}", id))
}

fn incompatible(subject: String, expected: &PrivacyScope, actual: &PrivacyScope) -> GroupError {
    GroupError::IncompatiblePrivacy {
        subject,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

//! Mutating operations on [`GroupCache`].
//!
//! Each boolean operation has a `try_*` twin that reports why it was
//! rejected. Rejections never change state.

use chrono::Utc;
use std::collections::HashSet;
use tracing::debug;

use super::state::Changes;
use super::GroupCache;
use crate::error::GroupError;
use crate::heuristic::{decide, GroupingDecision, GroupingOutcome, TabFacts};
use crate::model::{Group, GroupColor, GroupId, PrivacyScope, TabId};

impl GroupCache {
    /// Creates a group from `tab_ids`, pulling each tab out of its previous
    /// group first. Duplicate ids are ignored.
    ///
    /// Fails with `InvalidArgument` for an empty set and with
    /// `IncompatiblePrivacy` if the tabs cannot share a group.
    pub async fn create_group(
        &self,
        tab_ids: impl IntoIterator<Item = TabId>,
        name: Option<String>,
        color: Option<GroupColor>,
    ) -> Result<Group, GroupError> {
        let members: Vec<(TabId, PrivacyScope)> = tab_ids
            .into_iter()
            .map(|tab| {
                let scope = self.sessions().scope_of(&tab);
                (tab, scope)
            })
            .collect();
        let group = self
            .mutate(|state| state.create_group(members, name, color, Utc::now()))
            .await?;
        debug!(group_id = %group.id, members = group.len(), "group created");
        Ok(group)
    }

    /// Adds `tab_id` to `group_id` at `position` (clamped, default end).
    pub async fn try_add_tab_to_group(
        &self,
        tab_id: &TabId,
        group_id: GroupId,
        position: Option<usize>,
    ) -> Result<(), GroupError> {
        let scope = self.sessions().scope_of(tab_id);
        self.mutate(|state| Ok(((), state.add_tab(tab_id, &scope, group_id, position)?)))
            .await
    }

    /// Boolean form of [`try_add_tab_to_group`](Self::try_add_tab_to_group).
    /// Already being a member counts as success.
    pub async fn add_tab_to_group(
        &self,
        tab_id: &TabId,
        group_id: GroupId,
        position: Option<usize>,
    ) -> bool {
        report(
            "add_tab_to_group",
            self.try_add_tab_to_group(tab_id, group_id, position).await,
        )
    }

    /// Removes `tab_id` from its group, deleting the group if it empties.
    pub async fn try_remove_tab_from_group(&self, tab_id: &TabId) -> Result<(), GroupError> {
        self.mutate(|state| Ok(((), state.remove_tab(tab_id)?)))
            .await
    }

    pub async fn remove_tab_from_group(&self, tab_id: &TabId) -> bool {
        report(
            "remove_tab_from_group",
            self.try_remove_tab_from_group(tab_id).await,
        )
    }

    pub async fn try_rename_group(&self, group_id: GroupId, name: String) -> Result<(), GroupError> {
        self.mutate(|state| Ok(((), state.rename(group_id, name)?)))
            .await
    }

    /// Renames a group. An empty name is valid.
    pub async fn rename_group(&self, group_id: GroupId, name: impl Into<String>) -> bool {
        report(
            "rename_group",
            self.try_rename_group(group_id, name.into()).await,
        )
    }

    pub async fn try_recolor_group(
        &self,
        group_id: GroupId,
        color: GroupColor,
    ) -> Result<(), GroupError> {
        self.mutate(|state| Ok(((), state.recolor(group_id, color)?)))
            .await
    }

    pub async fn recolor_group(&self, group_id: GroupId, color: GroupColor) -> bool {
        report(
            "recolor_group",
            self.try_recolor_group(group_id, color).await,
        )
    }

    /// Deletes a group and all of its memberships. The tabs themselves stay.
    pub async fn try_delete_group(&self, group_id: GroupId) -> Result<(), GroupError> {
        self.mutate(|state| Ok(((), state.delete_group(group_id)?)))
            .await
    }

    pub async fn delete_group(&self, group_id: GroupId) -> bool {
        report("delete_group", self.try_delete_group(group_id).await)
    }

    /// Appends every member of `source_id` to `target_id` and deletes the source.
    pub async fn try_merge_groups(
        &self,
        source_id: GroupId,
        target_id: GroupId,
    ) -> Result<(), GroupError> {
        self.mutate(|state| Ok(((), state.merge(source_id, target_id)?)))
            .await
    }

    pub async fn merge_groups(&self, source_id: GroupId, target_id: GroupId) -> bool {
        report(
            "merge_groups",
            self.try_merge_groups(source_id, target_id).await,
        )
    }

    /// Moves `tab_id` from `from_id` to `to_id` with a single move event.
    pub async fn try_move_tab_between_groups(
        &self,
        tab_id: &TabId,
        from_id: GroupId,
        to_id: GroupId,
        position: Option<usize>,
    ) -> Result<(), GroupError> {
        let scope = self.sessions().scope_of(tab_id);
        self.mutate(|state| {
            Ok((
                (),
                state.move_tab(tab_id, &scope, from_id, to_id, position)?,
            ))
        })
        .await
    }

    pub async fn move_tab_between_groups(
        &self,
        tab_id: &TabId,
        from_id: GroupId,
        to_id: GroupId,
        position: Option<usize>,
    ) -> bool {
        report(
            "move_tab_between_groups",
            self.try_move_tab_between_groups(tab_id, from_id, to_id, position)
                .await,
        )
    }

    /// Moves `tab_id` to `position` inside its own group.
    pub async fn try_reorder_tab_in_group(
        &self,
        tab_id: &TabId,
        position: usize,
    ) -> Result<(), GroupError> {
        self.mutate(|state| Ok(((), state.reorder_tab(tab_id, position)?)))
            .await
    }

    pub async fn reorder_tab_in_group(&self, tab_id: &TabId, position: usize) -> bool {
        report(
            "reorder_tab_in_group",
            self.try_reorder_tab_in_group(tab_id, position).await,
        )
    }

    /// Decides and applies auto-grouping for `new_tab` in one critical
    /// section. Group membership in the facts is re-read under the lock, so
    /// the decision always sees every mutation committed before it.
    pub(crate) async fn apply_grouping(
        &self,
        mut new_tab: TabFacts,
        mut source: Option<TabFacts>,
    ) -> Result<GroupingOutcome, GroupError> {
        let now = Utc::now();
        self.mutate(|state| {
            new_tab.group_id = state.group_of(&new_tab.tab_id);
            if let Some(source) = source.as_mut() {
                source.group_id = state.group_of(&source.tab_id);
            }
            match decide(&new_tab, source.as_ref()) {
                GroupingDecision::Decline(reason) => {
                    Ok((GroupingOutcome::Declined(reason), Changes::default()))
                }
                GroupingDecision::JoinGroup(group_id) => {
                    let changes =
                        state.add_tab(&new_tab.tab_id, &new_tab.scope, group_id, None)?;
                    Ok((GroupingOutcome::Joined(group_id), changes))
                }
                GroupingDecision::CreateGroup { source: source_id, new } => {
                    let source_scope = source
                        .as_ref()
                        .map(|s| s.scope.clone())
                        .unwrap_or_default();
                    let members = vec![(source_id, source_scope), (new, new_tab.scope.clone())];
                    let (group, changes) = state.create_group(members, None, None, now)?;
                    Ok((GroupingOutcome::Created(group.id), changes))
                }
            }
        })
        .await
    }

    /// Lifecycle hook for a closed tab. Membership is dropped immediately.
    ///
    /// Returns `true` if the tab was grouped.
    pub async fn on_tab_closed(&self, tab_id: &TabId) -> bool {
        match self.try_remove_tab_from_group(tab_id).await {
            Ok(()) => true,
            Err(GroupError::NotFound(_)) => false,
            Err(e) => {
                debug!(tab_id = %tab_id, error = %e, "close cleanup rejected");
                false
            }
        }
    }

    /// Drops memberships of tabs that are not in `existing`, as after a
    /// session restore. Returns the number of memberships removed.
    pub async fn synchronize(&self, existing: impl IntoIterator<Item = TabId>) -> usize {
        let existing: HashSet<TabId> = existing.into_iter().collect();
        let result = self
            .mutate(|state| {
                let changes = state.retain_tabs(&existing);
                let removed = changes
                    .events
                    .iter()
                    .filter(|e| matches!(e, super::GroupEvent::TabRemovedFromGroup { .. }))
                    .count();
                Ok((removed, changes))
            })
            .await;
        let removed = result.unwrap_or(0);
        if removed > 0 {
            debug!(removed, "pruned memberships of missing tabs");
        }
        removed
    }
}

fn report(op: &'static str, result: Result<(), GroupError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!(op, error = %e, "group operation rejected");
            false
        }
    }
}

//! Add, remove, move, reorder and close tests for GroupCache.

use super::{assert_invariants, harness, tab};
use crate::error::GroupError;
use crate::groups::GroupEvent;
use crate::model::GroupId;

// =========================================================================
// add_tab_to_group
// =========================================================================

#[tokio::test]
async fn test_add_appends_by_default() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("create");

    assert!(h.cache.add_tab_to_group(&tab("t2"), group.id, None).await);
    assert_eq!(
        h.cache.group(group.id).map(|g| g.tab_ids),
        Some(vec![tab("t1"), tab("t2")])
    );
}

#[tokio::test]
async fn test_add_clamps_position() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1"), tab("t2")], None, None)
        .await
        .expect("create");

    assert!(h.cache.add_tab_to_group(&tab("t0"), group.id, Some(0)).await);
    assert!(h.cache.add_tab_to_group(&tab("t9"), group.id, Some(100)).await);
    assert_eq!(
        h.cache.group(group.id).map(|g| g.tab_ids),
        Some(vec![tab("t0"), tab("t1"), tab("t2"), tab("t9")])
    );
}

#[tokio::test]
async fn test_add_to_unknown_group_fails() {
    let h = harness();
    assert!(
        !h.cache
            .add_tab_to_group(&tab("t1"), GroupId::new_random(), None)
            .await
    );
    assert!(!h.cache.is_tab_grouped(&tab("t1")));
}

#[tokio::test]
async fn test_add_existing_member_is_noop_success() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1"), tab("t2")], None, None)
        .await
        .expect("create");
    let mut rx = h.cache.subscribe_snapshots();
    rx.borrow_and_update();

    assert!(h.cache.add_tab_to_group(&tab("t1"), group.id, Some(1)).await);
    assert_eq!(
        h.cache.group(group.id).map(|g| g.tab_ids),
        Some(vec![tab("t1"), tab("t2")]),
        "position is ignored for existing members"
    );
    assert!(!rx.has_changed().expect("sender alive"));
}

#[tokio::test]
async fn test_add_moves_tab_out_of_previous_group() {
    let h = harness();
    let a = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("a");
    let b = h
        .cache
        .create_group([tab("t2")], None, None)
        .await
        .expect("b");

    assert!(h.cache.add_tab_to_group(&tab("t1"), b.id, None).await);
    assert!(h.cache.group(a.id).is_none(), "emptied source is deleted");
    assert_eq!(
        h.cache.group(b.id).map(|g| g.tab_ids),
        Some(vec![tab("t2"), tab("t1")])
    );
    assert_invariants(&h.cache);
}

#[tokio::test]
async fn test_add_emits_position() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("create");
    let mut rx = h.cache.subscribe_events();

    assert!(h.cache.add_tab_to_group(&tab("t2"), group.id, None).await);
    assert_eq!(
        rx.recv().await.expect("event"),
        GroupEvent::TabAddedToGroup {
            tab_id: tab("t2"),
            group_id: group.id,
            position: 1
        }
    );
}

// =========================================================================
// remove_tab_from_group
// =========================================================================

#[tokio::test]
async fn test_remove_until_group_disappears() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1"), tab("t2")], None, None)
        .await
        .expect("create");

    assert!(h.cache.remove_tab_from_group(&tab("t1")).await);
    assert_eq!(
        h.cache.group(group.id).map(|g| g.tab_ids),
        Some(vec![tab("t2")])
    );

    assert!(h.cache.remove_tab_from_group(&tab("t2")).await);
    assert!(h.cache.group(group.id).is_none());
    assert!(h.cache.all_groups().is_empty());
}

#[tokio::test]
async fn test_remove_ungrouped_tab_fails() {
    let h = harness();
    assert!(!h.cache.remove_tab_from_group(&tab("t1")).await);
    assert!(matches!(
        h.cache.try_remove_tab_from_group(&tab("t1")).await,
        Err(GroupError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_remove_last_member_emits_removal_then_deletion() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("create");
    let mut rx = h.cache.subscribe_events();

    assert!(h.cache.remove_tab_from_group(&tab("t1")).await);
    assert_eq!(
        rx.recv().await.expect("removal"),
        GroupEvent::TabRemovedFromGroup {
            tab_id: tab("t1"),
            group_id: group.id
        }
    );
    assert_eq!(
        rx.recv().await.expect("deletion"),
        GroupEvent::GroupDeleted { group_id: group.id }
    );
}

#[tokio::test]
async fn test_on_tab_closed_removes_immediately() {
    let h = harness();
    h.cache
        .create_group([tab("t1"), tab("t2")], None, None)
        .await
        .expect("create");

    assert!(h.cache.on_tab_closed(&tab("t1")).await);
    assert!(!h.cache.is_tab_grouped(&tab("t1")));
    assert!(!h.cache.on_tab_closed(&tab("t1")).await, "already ungrouped");
}

// =========================================================================
// move_tab_between_groups
// =========================================================================

#[tokio::test]
async fn test_move_emits_single_notification() {
    let h = harness();
    let from = h
        .cache
        .create_group([tab("t1"), tab("t2")], None, None)
        .await
        .expect("from");
    let to = h
        .cache
        .create_group([tab("t3")], None, None)
        .await
        .expect("to");
    let mut rx = h.cache.subscribe_events();

    assert!(
        h.cache
            .move_tab_between_groups(&tab("t1"), from.id, to.id, Some(0))
            .await
    );
    assert_eq!(
        rx.recv().await.expect("move"),
        GroupEvent::TabMovedBetweenGroups {
            tab_id: tab("t1"),
            from_id: from.id,
            to_id: to.id,
            position: 0
        }
    );
    assert!(rx.try_recv().is_err(), "no further events");
    assert_eq!(
        h.cache.group(to.id).map(|g| g.tab_ids),
        Some(vec![tab("t1"), tab("t3")])
    );
    assert_invariants(&h.cache);
}

#[tokio::test]
async fn test_move_last_member_deletes_source() {
    let h = harness();
    let from = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("from");
    let to = h
        .cache
        .create_group([tab("t2")], None, None)
        .await
        .expect("to");

    assert!(
        h.cache
            .move_tab_between_groups(&tab("t1"), from.id, to.id, None)
            .await
    );
    assert!(h.cache.group(from.id).is_none());
    assert_eq!(h.cache.group_count(), 1);
}

#[tokio::test]
async fn test_move_rejects_wrong_source_and_same_group() {
    let h = harness();
    let a = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("a");
    let b = h
        .cache
        .create_group([tab("t2")], None, None)
        .await
        .expect("b");

    assert!(matches!(
        h.cache
            .try_move_tab_between_groups(&tab("t2"), a.id, b.id, None)
            .await,
        Err(GroupError::NotFound(_))
    ));
    assert!(matches!(
        h.cache
            .try_move_tab_between_groups(&tab("t1"), a.id, a.id, None)
            .await,
        Err(GroupError::InvalidArgument(_))
    ));
    assert!(
        !h.cache
            .move_tab_between_groups(&tab("t1"), a.id, GroupId::new_random(), None)
            .await
    );
    assert_eq!(h.cache.group_for_tab(&tab("t1")).map(|g| g.id), Some(a.id));
}

// =========================================================================
// reorder_tab_in_group / synchronize
// =========================================================================

#[tokio::test]
async fn test_reorder_within_group() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1"), tab("t2"), tab("t3")], None, None)
        .await
        .expect("create");

    assert!(h.cache.reorder_tab_in_group(&tab("t3"), 0).await);
    assert_eq!(
        h.cache.group(group.id).map(|g| g.tab_ids),
        Some(vec![tab("t3"), tab("t1"), tab("t2")])
    );
    assert!(!h.cache.reorder_tab_in_group(&tab("nope"), 0).await);
}

#[tokio::test]
async fn test_synchronize_prunes_missing_tabs() {
    let h = harness();
    let keep = h
        .cache
        .create_group([tab("t1"), tab("t2")], None, None)
        .await
        .expect("keep");
    let gone = h
        .cache
        .create_group([tab("t3")], None, None)
        .await
        .expect("gone");

    let removed = h.cache.synchronize([tab("t1"), tab("t9")]).await;

    assert_eq!(removed, 2);
    assert_eq!(h.cache.group(keep.id).map(|g| g.tab_ids), Some(vec![tab("t1")]));
    assert!(h.cache.group(gone.id).is_none());
    assert_invariants(&h.cache);
}

#[tokio::test]
async fn test_synchronize_with_all_tabs_present_is_quiet() {
    let h = harness();
    h.cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("create");
    let revision = h.cache.snapshot().revision();

    assert_eq!(h.cache.synchronize([tab("t1")]).await, 0);
    assert_eq!(h.cache.snapshot().revision(), revision);
}

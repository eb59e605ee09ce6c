//! create_group tests for GroupCache.

use super::{assert_invariants, harness, tab};
use crate::error::GroupError;
use crate::groups::GroupEvent;
use crate::model::{GroupColor, TabId};

#[tokio::test]
async fn test_create_with_empty_set_is_invalid() {
    let h = harness();
    let result = h.cache.create_group(Vec::<TabId>::new(), None, None).await;
    assert!(matches!(result, Err(GroupError::InvalidArgument(_))));
    assert_eq!(h.cache.group_count(), 0);
}

#[tokio::test]
async fn test_create_defaults_to_unnamed() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("create");
    assert_eq!(group.name, "");
    assert_eq!(group.tab_ids, vec![tab("t1")]);
}

#[tokio::test]
async fn test_create_keeps_given_order_and_dedupes() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t3"), tab("t1"), tab("t3"), tab("t2")], None, None)
        .await
        .expect("create");
    assert_eq!(group.tab_ids, vec![tab("t3"), tab("t1"), tab("t2")]);
}

#[tokio::test]
async fn test_create_uses_explicit_color() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("t1")], None, Some(GroupColor::Pink))
        .await
        .expect("create");
    assert_eq!(group.color, GroupColor::Pink);
}

#[tokio::test]
async fn test_create_picks_least_used_color() {
    let h = harness();
    h.cache
        .create_group([tab("t1")], None, Some(GroupColor::PALETTE[0]))
        .await
        .expect("first");
    let second = h
        .cache
        .create_group([tab("t2")], None, None)
        .await
        .expect("second");
    assert_eq!(second.color, GroupColor::PALETTE[1]);
}

#[tokio::test]
async fn test_create_steals_tabs_and_deletes_emptied_group() {
    let h = harness();
    let old = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("old");
    let partial = h
        .cache
        .create_group([tab("t2"), tab("t3")], None, None)
        .await
        .expect("partial");

    let new = h
        .cache
        .create_group([tab("t1"), tab("t2")], None, None)
        .await
        .expect("new");

    assert!(h.cache.group(old.id).is_none(), "emptied group is deleted");
    assert_eq!(
        h.cache.group(partial.id).map(|g| g.tab_ids),
        Some(vec![tab("t3")])
    );
    assert_eq!(h.cache.group_for_tab(&tab("t1")).map(|g| g.id), Some(new.id));
    assert_eq!(h.cache.group_count(), 2);
    assert_invariants(&h.cache);
}

#[tokio::test]
async fn test_create_emits_removals_before_creation() {
    let h = harness();
    let old = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("old");
    let mut rx = h.cache.subscribe_events();

    let new = h
        .cache
        .create_group([tab("t1")], None, None)
        .await
        .expect("new");

    assert_eq!(
        rx.recv().await.expect("removal"),
        GroupEvent::TabRemovedFromGroup {
            tab_id: tab("t1"),
            group_id: old.id
        }
    );
    assert_eq!(
        rx.recv().await.expect("deletion"),
        GroupEvent::GroupDeleted { group_id: old.id }
    );
    assert_eq!(
        rx.recv().await.expect("creation"),
        GroupEvent::GroupCreated { group: new }
    );
}

#[tokio::test]
async fn test_create_for_unknown_tabs_uses_normal_scope() {
    let h = harness();
    let group = h
        .cache
        .create_group([tab("ghost")], None, None)
        .await
        .expect("unknown tabs are treated as normal");
    assert!(!group.scope.private);
    assert_eq!(group.scope.profile, None);
}

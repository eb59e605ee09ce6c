//! Privacy and profile isolation tests for GroupCache.

use super::{assert_invariants, harness};
use crate::error::GroupError;
use crate::model::PrivacyScope;

#[tokio::test]
async fn test_private_tab_cannot_join_normal_group() {
    let h = harness();
    let n1 = h.open("n1", "https://a.com");
    let p1 = h.open_with("p1", "https://b.com", PrivacyScope::private());
    let p2 = h.open_with("p2", "https://c.com", PrivacyScope::private());

    let normal = h
        .cache
        .create_group([n1.clone()], None, None)
        .await
        .expect("normal group");
    let private = h
        .cache
        .create_group([p1.clone(), p2.clone()], None, None)
        .await
        .expect("private group");

    assert!(!h.cache.add_tab_to_group(&p1, normal.id, None).await);
    assert_eq!(h.cache.group(normal.id).map(|g| g.tab_ids), Some(vec![n1]));
    assert_eq!(
        h.cache.group(private.id).map(|g| g.tab_ids),
        Some(vec![p1, p2])
    );
    assert_invariants(&h.cache);
}

#[tokio::test]
async fn test_try_add_reports_incompatible_privacy() {
    let h = harness();
    let n1 = h.open("n1", "https://a.com");
    let p1 = h.open_with("p1", "https://b.com", PrivacyScope::private());
    let group = h
        .cache
        .create_group([p1], None, None)
        .await
        .expect("private group");

    let err = h
        .cache
        .try_add_tab_to_group(&n1, group.id, None)
        .await
        .expect_err("normal into private");
    assert!(matches!(err, GroupError::IncompatiblePrivacy { .. }));
}

#[tokio::test]
async fn test_create_rejects_mixed_privacy() {
    let h = harness();
    let n1 = h.open("n1", "https://a.com");
    let p1 = h.open_with("p1", "https://b.com", PrivacyScope::private());

    let result = h.cache.create_group([n1, p1], None, None).await;
    assert!(matches!(result, Err(GroupError::IncompatiblePrivacy { .. })));
    assert_eq!(h.cache.group_count(), 0);
}

#[tokio::test]
async fn test_distinct_profiles_do_not_mix() {
    let h = harness();
    let w = h.open_with("w", "https://a.com", PrivacyScope::profile("work"));
    let p = h.open_with("p", "https://b.com", PrivacyScope::profile("home"));
    let group = h
        .cache
        .create_group([w], None, None)
        .await
        .expect("work group");

    assert!(!h.cache.add_tab_to_group(&p, group.id, None).await);
}

#[tokio::test]
async fn test_unassigned_group_narrows_to_joining_profile() {
    let h = harness();
    let guest = h.open("guest", "https://a.com");
    let work = h.open_with("work", "https://b.com", PrivacyScope::profile("work"));
    let home = h.open_with("home", "https://c.com", PrivacyScope::profile("home"));
    let group = h
        .cache
        .create_group([guest], None, None)
        .await
        .expect("guest group");

    assert!(h.cache.add_tab_to_group(&work, group.id, None).await);
    assert_eq!(
        h.cache.group(group.id).map(|g| g.scope),
        Some(PrivacyScope::profile("work"))
    );
    assert!(!h.cache.add_tab_to_group(&home, group.id, None).await);
}

#[tokio::test]
async fn test_merge_across_privacy_is_rejected() {
    let h = harness();
    let n1 = h.open("n1", "https://a.com");
    let p1 = h.open_with("p1", "https://b.com", PrivacyScope::private());
    let normal = h
        .cache
        .create_group([n1], None, None)
        .await
        .expect("normal");
    let private = h
        .cache
        .create_group([p1], None, None)
        .await
        .expect("private");

    assert!(matches!(
        h.cache.try_merge_groups(private.id, normal.id).await,
        Err(GroupError::IncompatiblePrivacy { .. })
    ));
    assert_eq!(h.cache.group_count(), 2);
}

#[tokio::test]
async fn test_move_across_privacy_is_rejected() {
    let h = harness();
    let n1 = h.open("n1", "https://a.com");
    let n2 = h.open("n2", "https://a.com");
    let p1 = h.open_with("p1", "https://b.com", PrivacyScope::private());
    let normal = h
        .cache
        .create_group([n1.clone(), n2], None, None)
        .await
        .expect("normal");
    let private = h
        .cache
        .create_group([p1], None, None)
        .await
        .expect("private");

    assert!(
        !h.cache
            .move_tab_between_groups(&n1, normal.id, private.id, None)
            .await
    );
    assert_eq!(h.cache.group_for_tab(&n1).map(|g| g.id), Some(normal.id));
}

#[tokio::test]
async fn test_group_scope_widens_after_profile_tab_leaves() {
    let h = harness();
    let guest = h.open("guest", "https://a.com");
    let work = h.open_with("work", "https://b.com", PrivacyScope::profile("work"));
    let home = h.open_with("home", "https://c.com", PrivacyScope::profile("home"));
    let group = h
        .cache
        .create_group([guest.clone(), work.clone()], None, None)
        .await
        .expect("mixed group");

    assert!(h.cache.remove_tab_from_group(&work).await);
    assert_eq!(
        h.cache.group(group.id).map(|g| g.scope),
        Some(PrivacyScope::normal())
    );

    h.cache
        .try_add_tab_to_group(&home, group.id, None)
        .await
        .expect("home tab is compatible with the remaining guest tab");
    assert_eq!(
        h.cache.group(group.id).map(|g| g.scope),
        Some(PrivacyScope::profile("home"))
    );
    assert_invariants(&h.cache);
}

#[tokio::test]
async fn test_group_scope_widens_after_profile_tab_moves_out() {
    let h = harness();
    let guest = h.open("guest", "https://a.com");
    let work = h.open_with("work", "https://b.com", PrivacyScope::profile("work"));
    let other = h.open_with("other", "https://c.com", PrivacyScope::profile("work"));
    let mixed = h
        .cache
        .create_group([guest, work.clone()], None, None)
        .await
        .expect("mixed group");
    let work_group = h
        .cache
        .create_group([other], None, None)
        .await
        .expect("work group");

    assert!(
        h.cache
            .move_tab_between_groups(&work, mixed.id, work_group.id, None)
            .await
    );
    assert_eq!(
        h.cache.group(mixed.id).map(|g| g.scope),
        Some(PrivacyScope::normal())
    );
}

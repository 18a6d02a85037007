//! Property-based tests for access resolution
//!
//! Effective access is the maximum over every source, and the gate's
//! verdict follows from it alone.

use backup_acl::{AccessEngine, AccessLevel, BackupRef, BackupSpec, Operation};
use proptest::prelude::*;

fn level() -> impl Strategy<Value = AccessLevel> {
    prop_oneof![
        Just(AccessLevel::ViewOnly),
        Just(AccessLevel::Restore),
        Just(AccessLevel::Full),
    ]
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::View),
        Just(Operation::Restore),
        Just(Operation::Delete),
        Just(Operation::Duplicate),
    ]
}

struct Sources {
    direct: Option<AccessLevel>,
    group: Option<AccessLevel>,
    cluster: Option<AccessLevel>,
}

/// alice owns "b" on "prod"; bob (member of "ops") gets the given sources
fn build(sources: &Sources) -> AccessEngine {
    let engine = AccessEngine::builder().worker_pool_size(2).build().unwrap();
    engine.add_user("alice", "", "", "").unwrap();
    engine.add_user("bob", "", "", "").unwrap();
    engine.add_group("ops").unwrap();
    engine.add_user_to_group("bob", "ops").unwrap();

    let alice = engine.caller_for("alice").unwrap();
    engine.register_cluster(&alice, "prod").unwrap();
    engine.create_backup(&alice, BackupSpec::new("b", "prod")).unwrap();

    if let Some(level) = sources.direct {
        engine
            .share_backup(&alice, "b", &[], &["bob".to_string()], level)
            .unwrap();
    }
    if let Some(level) = sources.group {
        engine
            .share_backup(&alice, "b", &["ops".to_string()], &[], level)
            .unwrap();
    }
    if let Some(level) = sources.cluster {
        engine
            .cluster_update_backup_share(&alice, "prod", &[], &["bob".to_string()], level, true)
            .unwrap();
        engine.run_pending_propagation().unwrap();
    }
    engine
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_effective_access_is_maximum(
        direct in prop::option::of(level()),
        group in prop::option::of(level()),
        cluster in prop::option::of(level()),
    ) {
        let engine = build(&Sources { direct, group, cluster });
        let bob = engine.caller_for("bob").unwrap();

        let expected = direct.max(group).max(cluster);
        let actual = engine.effective_access(&bob, &BackupRef::named("b")).unwrap();
        prop_assert_eq!(actual, expected);

        let listed = engine.backups_for(&bob).unwrap();
        prop_assert_eq!(listed.len(), usize::from(expected.is_some()));
    }

    #[test]
    fn prop_gate_follows_effective_access(
        direct in prop::option::of(level()),
        cluster in prop::option::of(level()),
        op in operation(),
    ) {
        let engine = build(&Sources { direct, group: None, cluster });
        let bob = engine.caller_for("bob").unwrap();
        let effective = direct.max(cluster);

        match engine.authorize(&bob, &BackupRef::named("b"), op) {
            Ok(_) => prop_assert!(effective.map_or(false, |l| l >= op.required_level())),
            Err(e) if e.is_not_found() => prop_assert!(effective.is_none()),
            Err(e) => {
                prop_assert!(e.is_permission_denied());
                prop_assert!(effective.map_or(false, |l| l < op.required_level()));
            }
        }
    }

    #[test]
    fn prop_disabling_cluster_rule_keeps_direct_level(
        direct in prop::option::of(level()),
        cluster in level(),
    ) {
        let engine = build(&Sources { direct, group: None, cluster: Some(cluster) });
        let alice = engine.caller_for("alice").unwrap();
        let bob = engine.caller_for("bob").unwrap();

        engine
            .cluster_update_backup_share(&alice, "prod", &[], &["bob".to_string()], cluster, false)
            .unwrap();
        engine.run_pending_propagation().unwrap();

        let actual = engine.effective_access(&bob, &BackupRef::named("b")).unwrap();
        prop_assert_eq!(actual, direct);
    }
}

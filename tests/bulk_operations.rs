//! Bulk principal and share operations through the worker pool

use backup_acl::{AccessEngine, AccessLevel, BackupRef, BackupSpec, Operation};
use std::sync::Arc;
use std::thread;

fn user_names(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
}

#[test]
fn test_bulk_user_creation_reports_each_failure() {
    let engine = AccessEngine::builder().worker_pool_size(4).build().unwrap();
    engine.add_user("user-3", "", "", "").unwrap();

    let mut names = user_names("user", 20);
    names.push("bad name!".to_string());
    let outcome = engine.add_users(&names);

    assert_eq!(outcome.total(), 21);
    assert_eq!(outcome.succeeded.len(), 19);
    let failed: Vec<&str> = outcome.failed.iter().map(|(k, _)| k.as_str()).collect();
    assert!(failed.contains(&"user-3"));
    assert!(failed.contains(&"bad name!"));
    assert!(!outcome.is_complete());

    for name in &outcome.succeeded {
        engine.user_id(name).unwrap();
    }
}

#[test]
fn test_bulk_group_lifecycle() {
    let engine = AccessEngine::in_memory().unwrap();
    let groups = user_names("team", 10);

    assert!(engine.add_groups(&groups).is_complete());
    for group in &groups {
        engine.add_user(&format!("{}-lead", group), "", "", "").unwrap();
        engine
            .add_user_to_group(&format!("{}-lead", group), group)
            .unwrap();
    }
    assert_eq!(
        engine.members_of_group("team-4").unwrap(),
        vec!["team-4-lead".to_string()]
    );
    assert_eq!(engine.random_user_from_group("team-4").unwrap(), "team-4-lead");

    let outcome = engine.delete_groups(&groups);
    assert!(outcome.is_complete());
    assert!(engine.group_id("team-0").unwrap_err().is_not_found());
}

#[test]
fn test_share_many_backups_reports_per_backup() {
    let engine = AccessEngine::builder().worker_pool_size(3).build().unwrap();
    engine.add_user("alice", "", "", "").unwrap();
    engine.add_user("bob", "", "", "").unwrap();
    let alice = engine.caller_for("alice").unwrap();
    let bob = engine.caller_for("bob").unwrap();
    engine.register_cluster(&alice, "prod").unwrap();

    let mut refs = Vec::new();
    for i in 0..12 {
        let name = format!("b{:02}", i);
        engine
            .create_backup(&alice, BackupSpec::new(name.as_str(), "prod"))
            .unwrap();
        refs.push(BackupRef::named(name));
    }
    refs.push(BackupRef::named("missing"));

    let outcome = engine
        .share_backups(&alice, &refs, &[], &["bob".to_string()], AccessLevel::Restore)
        .unwrap();
    assert_eq!(outcome.succeeded.len(), 12);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, "missing");
    assert!(outcome.failed[0].1.is_not_found());

    assert_eq!(engine.backups_for(&bob).unwrap().len(), 12);
    engine
        .wait_for_visibility(
            &bob,
            &["b00", "b11"],
            std::time::Duration::from_secs(5),
            std::time::Duration::from_millis(10),
        )
        .unwrap();
}

#[test]
fn test_concurrent_deletes_all_succeed() {
    let engine = Arc::new(AccessEngine::in_memory().unwrap());
    engine.add_user("owner", "", "", "").unwrap();
    let holders = user_names("holder", 8);
    for name in &holders {
        engine.add_user(name, "", "", "").unwrap();
    }

    let owner = engine.caller_for("owner").unwrap();
    engine.register_cluster(&owner, "prod").unwrap();
    engine
        .create_backup(&owner, BackupSpec::new("shared", "prod"))
        .unwrap();
    engine
        .share_backup(&owner, "shared", &[], &holders, AccessLevel::Full)
        .unwrap();

    let handles: Vec<_> = holders
        .iter()
        .cloned()
        .map(|name| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let caller = engine.caller_for(&name).unwrap();
                engine.delete_backup(&caller, &BackupRef::named("shared"))
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let backup = engine
        .authorize(&owner, &BackupRef::named("shared"), Operation::View)
        .unwrap();
    assert!(backup.state.is_deleting());
}

#[test]
fn test_concurrent_shares_and_reads() {
    let engine = Arc::new(AccessEngine::in_memory().unwrap());
    engine.add_user("alice", "", "", "").unwrap();
    let readers = user_names("reader", 6);
    for name in &readers {
        engine.add_user(name, "", "", "").unwrap();
    }
    let alice = engine.caller_for("alice").unwrap();
    engine.register_cluster(&alice, "prod").unwrap();
    engine
        .create_backup(&alice, BackupSpec::new("b", "prod"))
        .unwrap();

    let writer = {
        let engine = Arc::clone(&engine);
        let alice = alice.clone();
        let readers = readers.clone();
        thread::spawn(move || {
            for reader in &readers {
                engine
                    .share_backup(&alice, "b", &[], &[reader.clone()], AccessLevel::ViewOnly)
                    .unwrap();
            }
        })
    };

    let polls: Vec<_> = readers
        .iter()
        .cloned()
        .map(|name| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let caller = engine.caller_for(&name).unwrap();
                for _ in 0..50 {
                    // Either not yet shared or view-only; never anything else
                    let access = engine
                        .effective_access(&caller, &BackupRef::named("b"))
                        .unwrap();
                    assert!(access.is_none() || access == Some(AccessLevel::ViewOnly));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for poll in polls {
        poll.join().unwrap();
    }
    assert_eq!(engine.grant_store().grant_count().unwrap(), readers.len());
}

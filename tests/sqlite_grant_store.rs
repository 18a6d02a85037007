//! Engine running on the SQLite grant store

use backup_acl::{
    AccessEngine, AccessGrant, AccessLevel, BackupRef, BackupSpec, BackupUid, ClusterId,
    GrantOrigin, GrantStore, Operation, PrincipalId, SqliteGrantStore,
};
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_grants_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grants.db");
    let object = BackupUid::new("backup-1");
    let bob = PrincipalId::new("bob");

    {
        let store = SqliteGrantStore::open(&path).unwrap();
        store
            .put_grant(AccessGrant::direct(
                object.clone(),
                bob.clone(),
                AccessLevel::Restore,
                PrincipalId::admin(),
                Utc::now(),
            ))
            .unwrap();
        store
            .put_grant(AccessGrant::from_cluster(
                BackupUid::new("backup-2"),
                bob.clone(),
                AccessLevel::ViewOnly,
                PrincipalId::admin(),
                Utc::now(),
                ClusterId::new("prod"),
            ))
            .unwrap();
    }

    let store = SqliteGrantStore::open(&path).unwrap();
    let grant = store.grant(&object, &bob).unwrap().unwrap();
    assert_eq!(grant.level, AccessLevel::Restore);
    assert_eq!(grant.origin, GrantOrigin::Direct);
    assert_eq!(store.grants_for_principal(&bob).unwrap().len(), 2);

    assert_eq!(
        store
            .remove_cluster_grants(&ClusterId::new("prod"), &bob)
            .unwrap(),
        1
    );
    assert_eq!(store.grant_count().unwrap(), 1);
}

#[test]
fn test_engine_on_sqlite_backend() {
    let dir = TempDir::new().unwrap();
    let engine = AccessEngine::builder()
        .sqlite(dir.path().join("acl.db"))
        .build()
        .unwrap();

    engine.add_user("alice", "", "", "").unwrap();
    engine.add_user("bob", "", "", "").unwrap();
    let alice = engine.caller_for("alice").unwrap();
    let bob = engine.caller_for("bob").unwrap();
    engine.register_cluster(&alice, "prod").unwrap();
    engine
        .create_backup(&alice, BackupSpec::new("nightly", "prod"))
        .unwrap();

    engine
        .share_backup(&alice, "nightly", &[], &["bob".to_string()], AccessLevel::Restore)
        .unwrap();
    engine
        .authorize(&bob, &BackupRef::named("nightly"), Operation::Restore)
        .unwrap();
    assert!(engine
        .authorize(&bob, &BackupRef::named("nightly"), Operation::Delete)
        .unwrap_err()
        .is_permission_denied());

    engine
        .cluster_update_backup_share(&alice, "prod", &[], &["bob".to_string()], AccessLevel::Full, true)
        .unwrap();
    engine.wait_for_cluster_share(&alice, "prod").unwrap();
    engine
        .authorize(&bob, &BackupRef::named("nightly"), Operation::Delete)
        .unwrap();

    // The direct grant kept its own row; cluster access comes from the rule
    let bob_id = engine.user_id("bob").unwrap();
    let rows = engine.grant_store().grants_for_principal(&bob_id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin, GrantOrigin::Direct);
}

#[test]
fn test_injected_store_is_used() {
    let store: Arc<dyn GrantStore> = Arc::new(SqliteGrantStore::in_memory().unwrap());
    let engine = AccessEngine::builder()
        .with_grant_store(store.clone())
        .build()
        .unwrap();

    engine.add_user("alice", "", "", "").unwrap();
    engine.add_user("bob", "", "", "").unwrap();
    let alice = engine.caller_for("alice").unwrap();
    engine.register_cluster(&alice, "prod").unwrap();
    engine
        .create_backup(&alice, BackupSpec::new("nightly", "prod"))
        .unwrap();
    engine
        .share_backup(&alice, "nightly", &[], &["bob".to_string()], AccessLevel::ViewOnly)
        .unwrap();

    assert_eq!(store.grant_count().unwrap(), 1);
}

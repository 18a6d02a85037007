use backup_acl::{AccessEngine, AccessLevel, BackupRef, BackupSpec, Operation};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// Engine with `backups` backups owned by alice, half shared to group "ops"
/// and all covered by a cluster share to bob
fn populated_engine(backups: usize) -> AccessEngine {
    let engine = AccessEngine::in_memory().unwrap();
    engine.add_user("alice", "", "", "").unwrap();
    engine.add_user("bob", "", "", "").unwrap();
    engine.add_group("ops").unwrap();
    engine.add_user_to_group("bob", "ops").unwrap();

    let alice = engine.caller_for("alice").unwrap();
    engine.register_cluster(&alice, "prod").unwrap();
    for i in 0..backups {
        let name = format!("backup-{}", i);
        engine
            .create_backup(&alice, BackupSpec::new(name.as_str(), "prod"))
            .unwrap();
        if i % 2 == 0 {
            engine
                .share_backup(&alice, &name, &["ops".to_string()], &[], AccessLevel::Restore)
                .unwrap();
        }
    }
    engine
        .cluster_update_backup_share(&alice, "prod", &[], &["bob".to_string()], AccessLevel::ViewOnly, true)
        .unwrap();
    engine.run_pending_propagation().unwrap();
    engine
}

/// Single authorization decision (hot path)
fn bench_authorize(c: &mut Criterion) {
    let engine = populated_engine(100);
    let bob = engine.caller_for("bob").unwrap();
    let reference = BackupRef::named("backup-42");

    c.bench_function("authorize_restore", |b| {
        b.iter(|| {
            let result = engine.authorize(&bob, black_box(&reference), Operation::Restore);
            black_box(result.is_ok());
        });
    });
}

/// Listing with and without the cache
fn bench_listing(c: &mut Criterion) {
    let sizes = vec![10, 100, 1_000];

    let mut group = c.benchmark_group("listing");

    for size in sizes {
        let engine = populated_engine(size);
        let bob = engine.caller_for("bob").unwrap();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("cached", size), &size, |b, _| {
            b.iter(|| black_box(engine.backups_for(&bob).unwrap().len()));
        });

        group.bench_with_input(BenchmarkId::new("uncached", size), &size, |b, _| {
            b.iter(|| {
                engine.invalidate_listing(&bob);
                black_box(engine.backups_for(&bob).unwrap().len())
            });
        });
    }

    group.finish();
}

/// Cluster share fan-out over every backup in the cluster
fn bench_cluster_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cluster_propagation");
    group.sample_size(10);

    for size in [100, 1_000] {
        let engine = populated_engine(size);
        let alice = engine.caller_for("alice").unwrap();
        let mut level = AccessLevel::ViewOnly;

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                // Alternate levels so every run rewrites the rows
                level = if level == AccessLevel::ViewOnly {
                    AccessLevel::Restore
                } else {
                    AccessLevel::ViewOnly
                };
                engine
                    .cluster_update_backup_share(&alice, "prod", &["ops".to_string()], &[], level, true)
                    .unwrap();
                black_box(engine.run_pending_propagation().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_authorize,
    bench_listing,
    bench_cluster_propagation
);
criterion_main!(benches);

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use incarnation_sim::backup::{ManualScheduler, NoopScheduler};
use incarnation_sim::{
    BackupLedger, BackupType, CompletionScheduler, IncarnationStore, IncrementalChainResolver,
    InMemoryIncarnationStore, Lineage, RecoveryOptions, RecoveryType, RetentionPolicy,
    SimulatorSession, SystemClock,
};

/// Ledger of `n` completed backups alternating level 0 and level 1.
fn seeded_ledger(n: usize) -> BackupLedger {
    let ledger = BackupLedger::new();
    let scheduler = ManualScheduler::new();
    for i in 0..n {
        let t = if i % 8 == 0 { BackupType::IncrL0 } else { BackupType::IncrL1 };
        let event = ledger.create_backup(t, &IncrementalChainResolver).unwrap();
        scheduler.schedule(event.id).unwrap();
        scheduler.fire_all(&ledger).unwrap();
    }
    ledger
}

fn bench_retention(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/apply_retention");
    for n in [64_usize, 1024, 16_384] {
        let ledger = seeded_ledger(n);
        let narrow = RetentionPolicy::new(n / 4).unwrap();
        let wide = RetentionPolicy::new(n).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                black_box(ledger.apply_policy(narrow).unwrap());
                black_box(ledger.apply_policy(wide).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_level1_resolution(c: &mut Criterion) {
    let ledger = seeded_ledger(4096);
    c.bench_function("ledger/latest_completed_incremental", |b| {
        b.iter(|| black_box(ledger.latest_completed_incremental().unwrap()));
    });
}

fn bench_recovery_chain(c: &mut Criterion) {
    c.bench_function("session/recover_complete_x64", |b| {
        b.iter(|| {
            let clock = Arc::new(SystemClock::new());
            let session = SimulatorSession::with_parts(
                Arc::new(InMemoryIncarnationStore::with_clock(clock.clone())),
                Arc::new(BackupLedger::with_clock(clock.clone())),
                Arc::new(NoopScheduler) as Arc<dyn CompletionScheduler>,
                clock,
                RetentionPolicy::default(),
            );
            let mut leaf = session.create_incarnation(None, false).unwrap().id;
            let opts = RecoveryOptions::new(RecoveryType::Complete);
            for _ in 0..64 {
                leaf = session.recover(leaf, &opts).new_incarnation.unwrap().id;
            }
            black_box(leaf)
        });
    });
}

fn bench_lineage_validate(c: &mut Criterion) {
    let store = InMemoryIncarnationStore::new();
    let mut parent = None;
    for _ in 0..512 {
        parent = Some(store.create_incarnation(parent, false).unwrap().id);
    }
    store.select_active(parent.unwrap()).unwrap();
    let all = store.list_all().unwrap();
    c.bench_function("lineage/validate_512", |b| {
        b.iter(|| black_box(Lineage::new(&all).validate()));
    });
}

criterion_group!(
    ledger,
    bench_retention,
    bench_level1_resolution,
    bench_recovery_chain,
    bench_lineage_validate
);
criterion_main!(ledger);

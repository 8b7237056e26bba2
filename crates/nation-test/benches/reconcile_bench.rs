//! Benchmarks for nation reconciliation

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use nation_core::{AccountId, ContractId, CreationEventSet, LedgerCreationEvent, NationContent, TxHash};
use nation_ledger::MemoryLedger;
use nation_state::{ReconcileConfig, ReconciliationEngine};
use nation_store::MemoryStore;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("bench runtime")
}

fn seeded_ledger(nations: usize) -> MemoryLedger {
    let ledger = MemoryLedger::new(AccountId::new("0xbench"));
    for i in 0..nations {
        let metadata = NationContent::named(format!("nation-{i}"))
            .to_ledger_json()
            .expect("encode");
        ledger.publish(metadata);
    }
    ledger
}

fn bench_first_pass(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("reconcile_first_pass");
    group.sample_size(20);

    for nations in [10usize, 100, 1000] {
        let ledger = seeded_ledger(nations);
        group.bench_with_input(BenchmarkId::from_parameter(nations), &nations, |b, _| {
            b.to_async(&rt).iter(|| async {
                let engine = ReconciliationEngine::new(
                    AccountId::new("0xbench"),
                    Arc::new(ledger.clone()),
                    Arc::new(MemoryStore::new()),
                    ReconcileConfig::default(),
                );
                black_box(engine.reconcile().await.expect("reconcile"))
            })
        });
    }
    group.finish();
}

fn bench_steady_state_pass(c: &mut Criterion) {
    let rt = runtime();
    let ledger = seeded_ledger(500);
    let store = Arc::new(MemoryStore::new());
    let engine = ReconciliationEngine::new(
        AccountId::new("0xbench"),
        Arc::new(ledger.clone()),
        store,
        ReconcileConfig::default(),
    );
    rt.block_on(engine.reconcile()).expect("warm up");

    c.bench_function("reconcile_steady_state_500", |b| {
        b.to_async(&rt).iter(|| async { black_box(engine.reconcile().await.expect("reconcile")) })
    });
}

fn bench_event_set_duplicates(c: &mut Criterion) {
    let events: Vec<_> = (0..10_000u64)
        .map(|i| LedgerCreationEvent::new(ContractId::new(i % 1000), Some(TxHash::new(format!("0x{i:x}")))))
        .collect();

    c.bench_function("event_set_insert_10k_over_1k_ids", |b| {
        b.iter(|| {
            let mut set = CreationEventSet::new();
            for event in &events {
                set.insert(black_box(event.clone()));
            }
            black_box(set.len())
        })
    });
}

criterion_group!(
    benches,
    bench_first_pass,
    bench_steady_state_pass,
    bench_event_set_duplicates
);
criterion_main!(benches);

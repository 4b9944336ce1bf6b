//! Benchmarks for the continuous-query scheduler.
//!
//! Benchmarks cover:
//! - Basket append and swap-and-clear draining
//! - Evaluation rounds with no enabled transitions
//! - Firing rounds over chains of transitions
//! - Draining under concurrent producers

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use petrinet_scheduler::config::SchedulerConfig;
use petrinet_scheduler::core::{
    BasketCatalog, ColumnDef, ColumnType, EntryPoint, Row, Scheduler, Value,
};
use petrinet_scheduler::infra::FunctionBackend;

// ============================================================================
// Helper Functions
// ============================================================================

fn schema() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", ColumnType::Int),
        ColumnDef::new("reading", ColumnType::Float),
    ]
}

fn build_rows(n: u64) -> Vec<Row> {
    let mut rng = rand::rng();
    (0..n)
        .map(|i| {
            vec![
                Value::Int(i64::try_from(i).unwrap_or(i64::MAX)),
                Value::Float(rng.random_range(-40.0..60.0)),
            ]
        })
        .collect()
}

/// `len` transitions forwarding `b0 -> b1 -> ... -> b{len}`.
fn build_chain(len: usize) -> (Arc<BasketCatalog>, Scheduler<FunctionBackend>) {
    let catalog = Arc::new(BasketCatalog::new(Duration::from_millis(50)));
    for i in 0..=len {
        catalog.register(&format!("b{i}"), schema()).unwrap();
    }
    let backend = FunctionBackend::new(Arc::clone(&catalog));
    for i in 0..len {
        let source = format!("b{i}");
        let target = format!("b{}", i + 1);
        backend.define_forward(
            EntryPoint::new("bench", format!("hop{i}")),
            &[source.as_str()],
            Some(target.as_str()),
        );
    }
    let scheduler = Scheduler::new(
        SchedulerConfig::new().with_auto_start(false),
        Arc::clone(&catalog),
        backend,
    )
    .unwrap();
    for i in 0..len {
        let name = format!("hop{i}");
        scheduler
            .register(&name, EntryPoint::new("bench", name.clone()), "")
            .unwrap();
    }
    scheduler.resume_all();
    (catalog, scheduler)
}

// ============================================================================
// Basket Benchmarks
// ============================================================================

fn bench_basket_append_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("basket_append_swap");

    for size in [100, 1_000, 10_000] {
        let rows = build_rows(size);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            let catalog = BasketCatalog::new(Duration::from_millis(50));
            catalog.register("sensors", schema()).unwrap();
            b.iter(|| {
                catalog.append_rows("sensors", rows.clone()).unwrap();
                black_box(catalog.swap("sensors").unwrap());
            });
        });
    }
    group.finish();
}

fn bench_swap_under_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap_under_contention");

    for producers in [1, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(producers),
            &producers,
            |b, &producers| {
                let catalog = Arc::new(BasketCatalog::new(Duration::from_millis(50)));
                catalog.register("sensors", schema()).unwrap();
                let stop = Arc::new(AtomicBool::new(false));
                let handles: Vec<_> = (0..producers)
                    .map(|_| {
                        let catalog = Arc::clone(&catalog);
                        let stop = Arc::clone(&stop);
                        thread::spawn(move || {
                            let rows = build_rows(16);
                            while !stop.load(Ordering::Relaxed) {
                                let _ = catalog.append_rows("sensors", rows.clone());
                            }
                        })
                    })
                    .collect();

                b.iter(|| black_box(catalog.swap("sensors").unwrap().len()));

                stop.store(true, Ordering::Relaxed);
                for handle in handles {
                    handle.join().unwrap();
                }
            },
        );
    }
    group.finish();
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_idle_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("idle_round");

    for transitions in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(transitions as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(transitions),
            &transitions,
            |b, &transitions| {
                let (_catalog, scheduler) = build_chain(transitions);
                b.iter(|| black_box(scheduler.run_round()));
            },
        );
    }
    group.finish();
}

fn bench_chain_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_propagation");

    for len in [1, 8, 32] {
        let rows = build_rows(64);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let (catalog, scheduler) = build_chain(len);
            let sink = format!("b{len}");
            b.iter(|| {
                catalog.append_rows("b0", rows.clone()).unwrap();
                // Registration order equals chain order, so one round moves
                // the batch through every hop.
                let report = scheduler.run_round();
                black_box(report.fired.len());
                black_box(catalog.swap(&sink).unwrap());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(
    basket_benches,
    bench_basket_append_swap,
    bench_swap_under_contention
);

criterion_group!(scheduler_benches, bench_idle_round, bench_chain_propagation);

criterion_main!(basket_benches, scheduler_benches);

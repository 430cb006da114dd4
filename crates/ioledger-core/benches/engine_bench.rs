use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::{Arc, Barrier};
use std::thread;

use ioledger_core::{Engine, LedgerConfig, RwKind};

fn event_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_path");
    group.throughput(Throughput::Elements(1));

    let engine = Engine::new(LedgerConfig {
        max_pool_size: u64::MAX,
        ..LedgerConfig::default()
    });
    engine.record_open(3, "/tmp/bench.dat");

    group.bench_function("record_rw_known_fd", |b| {
        b.iter(|| engine.record_rw(black_box(3), RwKind::Write, black_box(4096)))
    });

    group.bench_function("record_rw_unknown_fd", |b| {
        b.iter(|| engine.record_rw(black_box(99), RwKind::Write, black_box(4096)))
    });

    group.bench_function("open_close_pair", |b| {
        b.iter(|| {
            engine.record_open(black_box(7), "/tmp/churn.dat");
            engine.record_close(black_box(7));
        })
    });

    group.finish();
}

fn contended_writers(c: &mut Criterion) {
    const THREADS: usize = 4;
    const EVENTS_PER_THREAD: u64 = 10_000;

    let mut group = c.benchmark_group("contended");
    group.throughput(Throughput::Elements(THREADS as u64 * EVENTS_PER_THREAD));
    group.sample_size(10);

    group.bench_function("4_threads_shared_path", |b| {
        b.iter(|| {
            let engine = Arc::new(Engine::new(LedgerConfig {
                max_pool_size: u64::MAX,
                ..LedgerConfig::default()
            }));
            engine.record_open(1, "/tmp/shared.dat");

            let barrier = Arc::new(Barrier::new(THREADS));
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let e = engine.clone();
                    let bar = barrier.clone();
                    thread::spawn(move || {
                        bar.wait();
                        for _ in 0..EVENTS_PER_THREAD {
                            e.record_rw(1, RwKind::Write, 512);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            black_box(engine.snapshot())
        })
    });

    group.finish();
}

fn snapshot_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(20);

    group.bench_function("rotate_1k_keys", |b| {
        let engine = Engine::new(LedgerConfig {
            max_pool_size: u64::MAX,
            ..LedgerConfig::default()
        });
        for i in 0..8i32 {
            engine.record_open(i, &format!("/tmp/f{i}"));
        }
        b.iter_batched(
            || {
                // 1k distinct paths via reopen churn on 8 fds.
                for i in 0..1000i32 {
                    let fd = i % 8;
                    engine.record_open(fd, &format!("/tmp/k{i}"));
                    engine.record_rw(fd, RwKind::Read, 128);
                }
            },
            |_| black_box(engine.snapshot()),
            criterion::BatchSize::PerIteration,
        )
    });

    group.finish();
}

criterion_group!(benches, event_path, contended_writers, snapshot_drain);
criterion_main!(benches);

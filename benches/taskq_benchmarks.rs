use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rust_kernel_context::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn benchmark_taskq_creation(c: &mut Criterion) {
    c.bench_function("taskq_creation_prepopulated", |b| {
        b.iter(|| {
            let tq = Taskq::create(TaskqConfig::new("bench_create", 4).with_prepopulate(true))
                .expect("Failed to create taskq");
            tq.destroy();
        });
    });
}

fn benchmark_dispatch_wait(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_wait");

    group.bench_function("lightweight_tasks_100", |b| {
        b.iter_batched(
            || {
                Taskq::create(TaskqConfig::new("bench_light", 4).with_prepopulate(true))
                    .expect("Failed to create taskq")
            },
            |tq| {
                for _ in 0..100 {
                    tq.dispatch(
                        || {
                            black_box(1 + 1);
                        },
                        DispatchFlags::SLEEP,
                    )
                    .expect("Failed to dispatch");
                }
                tq.wait();
                tq.destroy();
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("medium_tasks_100", |b| {
        b.iter_batched(
            || {
                Taskq::create(TaskqConfig::new("bench_medium", 4).with_prepopulate(true))
                    .expect("Failed to create taskq")
            },
            |tq| {
                for _ in 0..100 {
                    tq.dispatch(
                        || {
                            let mut sum = 0u64;
                            for i in 0..1000 {
                                sum = sum.wrapping_add(i);
                            }
                            black_box(sum);
                        },
                        DispatchFlags::SLEEP,
                    )
                    .expect("Failed to dispatch");
                }
                tq.wait();
                tq.destroy();
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("dynamic_burst_500", |b| {
        b.iter_batched(
            || {
                let config = TaskqConfig::new("bench_dynamic", 8)
                    .with_dynamic(1, 8)
                    .with_prepopulate(true)
                    .with_idle_timeout(Duration::from_millis(50));
                Taskq::create(config).expect("Failed to create taskq")
            },
            |tq| {
                let counter = Arc::new(AtomicU64::new(0));
                for _ in 0..500 {
                    let counter = Arc::clone(&counter);
                    tq.dispatch(
                        move || {
                            counter.fetch_add(1, Ordering::Relaxed);
                        },
                        DispatchFlags::SLEEP,
                    )
                    .expect("Failed to dispatch");
                }
                tq.wait();
                black_box(counter.load(Ordering::Relaxed));
                tq.destroy();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn benchmark_mutex(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmutex");
    let lock = KMutex::initialized("bench_mutex");

    group.bench_function("enter_exit", |b| {
        b.iter(|| {
            lock.enter();
            black_box(lock.held());
            lock.exit();
        });
    });

    group.bench_function("guard", |b| {
        b.iter(|| {
            let guard = lock.lock();
            black_box(&guard);
        });
    });

    group.finish();
}

fn benchmark_rwlock(c: &mut Criterion) {
    let mut group = c.benchmark_group("krwlock");
    let rw = KRwLock::initialized("bench_rw");

    group.bench_function("read_enter_exit", |b| {
        b.iter(|| {
            rw.enter(RwMode::Read);
            black_box(rw.read_held());
            rw.exit();
        });
    });

    group.bench_function("write_enter_exit", |b| {
        b.iter(|| {
            rw.enter(RwMode::Write);
            black_box(rw.write_held());
            rw.exit();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_taskq_creation,
    benchmark_dispatch_wait,
    benchmark_mutex,
    benchmark_rwlock
);
criterion_main!(benches);

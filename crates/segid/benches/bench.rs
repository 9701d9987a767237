use core::{hint::black_box, time::Duration};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use segid::{
    MemorySegmentStore, PrefetchWorkerExecutor, SegmentChainId, SegmentDefinition, SegmentStore,
    StoreSegmentDistributor,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of IDs drawn per benchmark iteration (split across threads for the
// contended variants).
const TOTAL_IDS: usize = 4096;

type Sequence = SegmentChainId<StoreSegmentDistributor<Arc<MemorySegmentStore>>>;

fn store(step: i64) -> Arc<MemorySegmentStore> {
    let store = Arc::new(MemorySegmentStore::default());
    store
        .add_segment(&SegmentDefinition::new("bench", 0, step, 10))
        .unwrap();
    store
}

fn synchronous(step: i64) -> Sequence {
    let distributor = StoreSegmentDistributor::new("bench", step, store(step)).unwrap();
    SegmentChainId::builder(distributor)
        .synchronous()
        .build()
        .unwrap()
}

fn prefetched(step: i64, executor: &Arc<PrefetchWorkerExecutor>) -> Sequence {
    let distributor = StoreSegmentDistributor::new("bench", step, store(step)).unwrap();
    SegmentChainId::builder(distributor)
        .executor(Arc::clone(executor))
        .build()
        .unwrap()
}

/// Single-threaded hot path. Each iteration builds a fresh sequence, so the
/// store round trips it needs are part of the measurement.
fn bench_next_id(c: &mut Criterion, group_name: &str, sequence_fn: impl Fn() -> Sequence) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{}", TOTAL_IDS), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let sequence = sequence_fn();
                for _ in 0..TOTAL_IDS {
                    black_box(sequence.next_id().unwrap());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Shared sequence across threads.
fn bench_next_id_contended(
    c: &mut Criterion,
    group_name: &str,
    sequence_fn: impl Fn() -> Sequence,
) {
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8, 16] {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_IDS, thread_count),
            |b| {
                b.iter_custom(|iters| {
                    let start = Instant::now();

                    for _ in 0..iters {
                        let sequence = Arc::new(sequence_fn());
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let sequence = Arc::clone(&sequence);
                                let barrier = Arc::clone(&barrier);
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..ids_per_thread {
                                        black_box(sequence.next_id().unwrap());
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn benchmarks(c: &mut Criterion) {
    bench_next_id(c, "next_id/synchronous/step_100", || synchronous(100));
    bench_next_id(c, "next_id/synchronous/step_5000", || synchronous(5000));
    bench_next_id_contended(c, "next_id/synchronous/contended", || synchronous(1000));

    let executor =
        Arc::new(PrefetchWorkerExecutor::new(Duration::from_millis(100), 2, false).unwrap());
    bench_next_id(c, "next_id/prefetched/step_100", || prefetched(100, &executor));
    bench_next_id_contended(c, "next_id/prefetched/contended", || {
        prefetched(1000, &executor)
    });
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);

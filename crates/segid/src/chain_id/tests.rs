use alloc::{sync::Arc, vec::Vec};
use core::time::Duration;
use std::{collections::HashSet, thread, time::Instant};

use super::{ChainState, PrefetchJob};
use crate::{
    Error, IdSegment, MemorySegmentStore, PrefetchWorkerExecutor, SegmentChainId, SegmentStore,
    StoreSegmentDistributor, TIME_TO_LIVE_FOREVER,
};

type MemoryDistributor = StoreSegmentDistributor<Arc<MemorySegmentStore>>;

fn store(namespace: &str, step: i64) -> Arc<MemorySegmentStore> {
    Arc::new(MemorySegmentStore::with_namespace(namespace, step).unwrap())
}

fn distributor(store: &Arc<MemorySegmentStore>, namespace: &str, step: i64) -> MemoryDistributor {
    StoreSegmentDistributor::new(namespace, step, Arc::clone(store)).unwrap()
}

fn executor(period: Duration) -> Arc<PrefetchWorkerExecutor> {
    Arc::new(PrefetchWorkerExecutor::new(period, 2, false).unwrap())
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn first_hundred_ids_come_from_one_fetch() {
    let store = store("order", 100);
    let ids = SegmentChainId::builder(distributor(&store, "order", 100))
        .synchronous()
        .build()
        .unwrap();
    assert!(!ids.is_prefetching());

    for expected in 1..=100 {
        assert_eq!(ids.next_id().unwrap(), expected);
    }
    assert_eq!(store.definition("order").unwrap().max_id, 100);
    assert_eq!(store.round_trips(), 1);

    assert_eq!(ids.next_id().unwrap(), 101);
    assert_eq!(store.definition("order").unwrap().max_id, 200);
    assert_eq!(store.round_trips(), 2);
    assert_eq!(ids.head().version(), 1);
}

#[test]
fn expired_head_is_refetched() {
    let store = store("order", 100);
    let ids = SegmentChainId::builder(distributor(&store, "order", 100))
        .ttl(1)
        .synchronous()
        .build()
        .unwrap();

    assert_eq!(ids.next_id().unwrap(), 1);
    assert_eq!(ids.next_id().unwrap(), 2);
    thread::sleep(Duration::from_millis(2_500));
    assert!(ids.head().is_expired());

    // The rest of the stale range is abandoned, never handed out.
    assert_eq!(ids.next_id().unwrap(), 101);
    assert_eq!(store.round_trips(), 2);
    assert_eq!(ids.head().version(), 1);
    assert!(!ids.head().is_expired());
    assert_eq!(ids.next_id().unwrap(), 102);
}

#[test]
fn store_failure_surfaces_and_recovers() {
    let store = store("order", 10);
    let ids = SegmentChainId::builder(distributor(&store, "order", 10))
        .synchronous()
        .build()
        .unwrap();

    store.set_failing(true);
    let err = ids.next_id().unwrap_err();
    assert!(matches!(err, Error::Segment(_)));
    assert!(ids.head().next().is_none());

    store.set_failing(false);
    assert_eq!(ids.next_id().unwrap(), 1);
}

#[test]
fn missing_namespace_surfaces() {
    let store = Arc::new(MemorySegmentStore::default());
    let ids = SegmentChainId::builder(distributor(&store, "ghost", 10))
        .synchronous()
        .build()
        .unwrap();
    assert!(matches!(
        ids.next_id(),
        Err(Error::SegmentNameMissing { ref namespace }) if namespace == "ghost"
    ));
}

#[test]
fn builder_rejects_bad_settings() {
    let store = store("order", 10);
    assert!(matches!(
        SegmentChainId::builder(distributor(&store, "order", 10))
            .ttl(0)
            .synchronous()
            .build(),
        Err(Error::IllegalArgument(_))
    ));
    assert!(matches!(
        SegmentChainId::builder(distributor(&store, "order", 10))
            .safe_distance(0)
            .synchronous()
            .build(),
        Err(Error::IllegalArgument(_))
    ));
}

#[test]
fn prefetch_runs_ahead_of_consumers() {
    let store = store("order", 100);
    let ids = SegmentChainId::builder(distributor(&store, "order", 100))
        .executor(executor(Duration::from_millis(5)))
        .build()
        .unwrap();
    assert!(ids.is_prefetching());

    let job = ids.job().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        job.tail().is_some_and(|tail| tail.max_id() >= 1_000)
    }));

    for expected in 1..=2_500 {
        assert_eq!(ids.next_id().unwrap(), expected);
    }
}

#[test]
fn ids_are_unique_and_increase_per_thread() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 5_000;

    let store = store("order", 100);
    let ids = SegmentChainId::builder(distributor(&store, "order", 100))
        .executor(executor(Duration::from_millis(5)))
        .build()
        .unwrap();

    let drawn: Vec<Vec<i64>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| s.spawn(|| (0..PER_THREAD).map(|_| ids.next_id().unwrap()).collect::<Vec<i64>>()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut seen = HashSet::with_capacity(THREADS * PER_THREAD);
    for per_thread in &drawn {
        assert!(per_thread.windows(2).all(|w| w[0] < w[1]));
        for &id in per_thread {
            assert!(id > 0);
            assert!(seen.insert(id), "duplicate id {id}");
        }
    }
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    assert!(store.definition("order").unwrap().max_id >= (THREADS * PER_THREAD) as i64);
}

#[test]
fn prefetch_distance_adapts_to_hunger() {
    let store = store("order", 100);
    let chain = Arc::new(ChainState::new(
        distributor(&store, "order", 100),
        TIME_TO_LIVE_FOREVER,
        10,
    ));
    let job = PrefetchJob::new(Arc::clone(&chain));
    let tail_max = |job: &PrefetchJob<MemoryDistributor>| job.tail().unwrap().max_id();

    // Calm: fill up to the safe distance in one merged fetch.
    job.prefetch(false).unwrap();
    assert_eq!(job.prefetch_distance(), 10);
    assert_eq!(tail_max(&job), 1_000);
    assert_eq!(store.round_trips(), 1);

    // The head moved onto the fetched node; one segment short of the safe
    // distance.
    job.prefetch(false).unwrap();
    assert_eq!(chain.head().version(), 0);
    assert_eq!(tail_max(&job), 1_100);

    job.prefetch(false).unwrap();
    assert_eq!(store.round_trips(), 2);

    // Hungry: the distance doubles and is appended regardless of the gap.
    job.prefetch(true).unwrap();
    assert_eq!(job.prefetch_distance(), 20);
    assert_eq!(tail_max(&job), 3_100);

    job.prefetch(true).unwrap();
    assert_eq!(job.prefetch_distance(), 40);
    assert_eq!(tail_max(&job), 7_100);
    assert_eq!(store.round_trips(), 4);

    // Calm again: halves back towards the safe distance without fetching.
    job.prefetch(false).unwrap();
    assert_eq!(job.prefetch_distance(), 20);
    job.prefetch(false).unwrap();
    job.prefetch(false).unwrap();
    assert_eq!(job.prefetch_distance(), 10);
    assert_eq!(store.round_trips(), 4);
}

#[test]
fn prefetch_errors_leave_the_chain_untouched() {
    let store = store("order", 100);
    let chain = Arc::new(ChainState::new(
        distributor(&store, "order", 100),
        TIME_TO_LIVE_FOREVER,
        10,
    ));
    let job = PrefetchJob::new(Arc::clone(&chain));

    store.set_failing(true);
    assert!(matches!(job.prefetch(false), Err(Error::Segment(_))));
    assert!(chain.head().next().is_none());

    store.set_failing(false);
    job.prefetch(false).unwrap();
    assert_eq!(job.tail().unwrap().max_id(), 1_000);
}

#[test]
fn drop_cancels_the_prefetch_job() {
    let executor = executor(Duration::from_secs(60));
    let store = store("order", 100);
    let ids = SegmentChainId::builder(distributor(&store, "order", 100))
        .executor(Arc::clone(&executor))
        .build()
        .unwrap();
    assert_eq!(executor.job_count(), 1);

    drop(ids);
    assert_eq!(executor.job_count(), 0);
    assert!(executor.workers().iter().all(|w| w.job_count() == 0));
}

#[test]
fn one_sequence_per_namespace_and_executor() {
    let executor = executor(Duration::from_secs(60));
    let store = store("order", 100);
    let _ids = SegmentChainId::builder(distributor(&store, "order", 100))
        .executor(Arc::clone(&executor))
        .build()
        .unwrap();

    assert!(matches!(
        SegmentChainId::builder(distributor(&store, "order", 100))
            .executor(executor)
            .build(),
        Err(Error::IllegalArgument(_))
    ));
}

#[test]
fn shut_down_executor_rejects_new_sequences() {
    let executor = executor(Duration::from_secs(60));
    executor.shutdown();
    let store = store("order", 100);
    assert!(matches!(
        SegmentChainId::builder(distributor(&store, "order", 100))
            .executor(executor)
            .build(),
        Err(Error::IllegalState(_))
    ));
}

use alloc::{string::String, sync::Arc};
use std::collections::HashMap;

use crate::{
    chain_id::SegmentChainId,
    concurrent::PrefetchWorkerExecutor,
    distributor::{SegmentDefinition, SegmentStore, StoreSegmentDistributor},
    error::Result,
    mutex::{Mutex, lock},
    time::TIME_TO_LIVE_FOREVER,
};

/// The sequence type a [`SegmentIdFactory`] hands out.
pub type StoreSegmentChainId<S> = SegmentChainId<StoreSegmentDistributor<Arc<S>>>;

/// One [`SegmentChainId`] per namespace over a shared [`SegmentStore`].
///
/// Sequences are created on first use from the namespace's stored step and
/// safe distance, and cached for the factory's lifetime.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use segid::{MemorySegmentStore, SegmentDefinition, SegmentIdFactory};
///
/// let factory = SegmentIdFactory::new(Arc::new(MemorySegmentStore::default())).synchronous();
/// factory.add_segment(&SegmentDefinition::new("order", 0, 100, 10)).unwrap();
///
/// assert_eq!(factory.next_id("order").unwrap(), 1);
/// assert_eq!(factory.next_id("order").unwrap(), 2);
/// ```
pub struct SegmentIdFactory<S>
where
    S: SegmentStore + 'static,
{
    store: Arc<S>,
    executor: Option<Arc<PrefetchWorkerExecutor>>,
    synchronous: bool,
    ttl: i64,
    sequences: Mutex<HashMap<String, Arc<StoreSegmentChainId<S>>>>,
}

impl<S> SegmentIdFactory<S>
where
    S: SegmentStore + 'static,
{
    /// A factory whose sequences are prefetched by the global executor.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            executor: None,
            synchronous: false,
            ttl: TIME_TO_LIVE_FOREVER,
            sequences: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn executor(mut self, executor: Arc<PrefetchWorkerExecutor>) -> Self {
        self.executor = Some(executor);
        self.synchronous = false;
        self
    }

    /// Sequences refill on the caller's thread only.
    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.executor = None;
        self.synchronous = true;
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Registers a namespace in the store.
    pub fn add_segment(&self, definition: &SegmentDefinition) -> Result<()> {
        self.store.add_segment(definition)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            namespace = %definition.namespace,
            max_id = definition.max_id,
            step = definition.step,
            safe_distance = definition.safe_distance,
            "segment added"
        );
        Ok(())
    }

    /// The cached sequence of `namespace`, created on first call.
    ///
    /// # Errors
    /// [`Error::SegmentNameMissing`](crate::Error::SegmentNameMissing) if the
    /// namespace is not registered, or any error from building the sequence.
    pub fn id_generator(&self, namespace: &str) -> Result<Arc<StoreSegmentChainId<S>>> {
        if let Some(sequence) = lock(&self.sequences)?.get(namespace) {
            return Ok(Arc::clone(sequence));
        }

        // No store round trip under the cache lock.
        let definition = self.store.definition(namespace)?;
        let distributor =
            StoreSegmentDistributor::new(namespace, definition.step, Arc::clone(&self.store))?;
        let mut builder = SegmentChainId::builder(distributor)
            .ttl(self.ttl)
            .safe_distance(definition.safe_distance);
        builder = match (&self.executor, self.synchronous) {
            (_, true) => builder.synchronous(),
            (Some(executor), false) => builder.executor(Arc::clone(executor)),
            (None, false) => builder,
        };

        let mut sequences = lock(&self.sequences)?;
        if let Some(sequence) = sequences.get(namespace) {
            return Ok(Arc::clone(sequence));
        }
        let sequence = Arc::new(builder.build()?);
        sequences.insert(namespace.into(), Arc::clone(&sequence));
        Ok(sequence)
    }

    /// Shorthand for `id_generator(namespace)?.next_id()`.
    pub fn next_id(&self, namespace: &str) -> Result<i64> {
        self.id_generator(namespace)?.next_id()
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::{
        sync::{
            Mutex as StdMutex, mpsc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Instant,
    };

    use super::*;
    use crate::{Error, MemorySegmentStore};

    /// Blocks `definition("slow")` until the gate is released.
    #[derive(Default)]
    struct GatedStore {
        inner: MemorySegmentStore,
        gate: StdMutex<()>,
        waiting: AtomicBool,
    }

    impl SegmentStore for GatedStore {
        fn increment_max_id(&self, namespace: &str, step: i64) -> Result<i64> {
            self.inner.increment_max_id(namespace, step)
        }

        fn definition(&self, namespace: &str) -> Result<SegmentDefinition> {
            if namespace == "slow" {
                self.waiting.store(true, Ordering::Release);
                let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            }
            self.inner.definition(namespace)
        }

        fn add_segment(&self, definition: &SegmentDefinition) -> Result<()> {
            self.inner.add_segment(definition)
        }
    }

    fn factory() -> SegmentIdFactory<MemorySegmentStore> {
        let factory = SegmentIdFactory::new(Arc::new(MemorySegmentStore::default())).synchronous();
        factory
            .add_segment(&SegmentDefinition::new("order", 0, 100, 10))
            .unwrap();
        factory
            .add_segment(&SegmentDefinition::new("user", 1_000, 10, 2))
            .unwrap();
        factory
    }

    #[test]
    fn caches_one_sequence_per_namespace() {
        let factory = factory();
        let a = factory.id_generator("order").unwrap();
        let b = factory.id_generator("order").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let user = factory.id_generator("user").unwrap();
        assert!(!Arc::ptr_eq(&a, &user));
        assert_eq!(user.namespace(), "user");
    }

    #[test]
    fn sequences_use_the_stored_definition() {
        let factory = factory();
        assert_eq!(factory.next_id("user").unwrap(), 1_001);
        assert_eq!(factory.store().definition("user").unwrap().max_id, 1_010);

        assert_eq!(factory.next_id("order").unwrap(), 1);
        assert_eq!(factory.store().definition("order").unwrap().max_id, 100);
    }

    #[test]
    fn unknown_namespace_is_not_cached() {
        let factory = factory();
        assert!(matches!(
            factory.id_generator("ghost"),
            Err(Error::SegmentNameMissing { .. })
        ));
        factory
            .add_segment(&SegmentDefinition::new("ghost", 0, 5, 1))
            .unwrap();
        assert_eq!(factory.next_id("ghost").unwrap(), 1);
    }

    #[test]
    fn prefetching_factory_binds_each_namespace_once() {
        let executor = Arc::new(PrefetchWorkerExecutor::new(Duration::from_millis(10), 2, false).unwrap());
        let factory = SegmentIdFactory::new(Arc::new(MemorySegmentStore::default()))
            .executor(Arc::clone(&executor));
        for namespace in ["order", "user", "invoice"] {
            factory
                .add_segment(&SegmentDefinition::new(namespace, 0, 50, 4))
                .unwrap();
        }

        for namespace in ["order", "user", "invoice", "order"] {
            assert!(factory.next_id(namespace).unwrap() > 0);
        }
        assert_eq!(executor.job_count(), 3);
    }

    #[test]
    fn slow_definition_does_not_block_other_namespaces() {
        let store = Arc::new(GatedStore::default());
        for namespace in ["slow", "order"] {
            store
                .add_segment(&SegmentDefinition::new(namespace, 0, 100, 10))
                .unwrap();
        }
        let factory = SegmentIdFactory::new(Arc::clone(&store)).synchronous();
        let factory = &factory;

        let gate = store.gate.lock().unwrap();
        thread::scope(|s| {
            let slow = s.spawn(move || factory.next_id("slow"));
            let deadline = Instant::now() + Duration::from_secs(5);
            while !store.waiting.load(Ordering::Acquire) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            assert!(store.waiting.load(Ordering::Acquire));

            let (tx, rx) = mpsc::channel();
            s.spawn(move || {
                let _ = tx.send(factory.next_id("order"));
            });
            let order = rx.recv_timeout(Duration::from_secs(5));
            drop(gate);

            assert_eq!(order.unwrap().unwrap(), 1);
            assert_eq!(slow.join().unwrap().unwrap(), 1);
        });
    }
}

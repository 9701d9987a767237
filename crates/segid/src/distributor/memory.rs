use std::collections::HashMap;

use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    distributor::{AsyncSegmentStore, SegmentDefinition, SegmentStore},
    error::{Error, Result},
    mutex::{Mutex, lock},
};

/// An in-process segment store.
///
/// Suitable for single-process deployments and tests. `set_failing(true)`
/// makes every increment fail with [`Error::Segment`], which is handy for
/// exercising retry paths.
#[derive(Debug, Default)]
pub struct MemorySegmentStore {
    rows: Mutex<HashMap<String, SegmentDefinition>>,
    failing: AtomicBool,
    round_trips: AtomicU64,
}

impl MemorySegmentStore {
    /// A store preloaded with a single namespace starting at zero.
    pub fn with_namespace(namespace: &str, step: i64) -> Result<Self> {
        let store = Self::default();
        store.add_segment(&SegmentDefinition::new(
            namespace,
            0,
            step,
            crate::DEFAULT_SAFE_DISTANCE,
        ))?;
        Ok(store)
    }

    /// Makes subsequent increments fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Number of successful increments served so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Acquire)
    }

    fn increment(&self, namespace: &str, step: i64) -> Result<i64> {
        if self.failing.load(Ordering::Acquire) {
            return Err(Error::segment("memory store is failing"));
        }
        let mut rows = lock(&self.rows)?;
        let row = rows
            .get_mut(namespace)
            .ok_or_else(|| Error::SegmentNameMissing {
                namespace: namespace.into(),
            })?;
        row.max_id += step;
        self.round_trips.fetch_add(1, Ordering::AcqRel);
        Ok(row.max_id)
    }

    fn read(&self, namespace: &str) -> Result<SegmentDefinition> {
        lock(&self.rows)?
            .get(namespace)
            .cloned()
            .ok_or_else(|| Error::SegmentNameMissing {
                namespace: namespace.into(),
            })
    }

    fn insert(&self, definition: &SegmentDefinition) -> Result<()> {
        definition.validate()?;
        let mut rows = lock(&self.rows)?;
        if rows.contains_key(&definition.namespace) {
            return Err(Error::IllegalArgument(format!(
                "namespace:[{}] already exists",
                definition.namespace
            )));
        }
        rows.insert(definition.namespace.clone(), definition.clone());
        Ok(())
    }
}

impl SegmentStore for MemorySegmentStore {
    fn increment_max_id(&self, namespace: &str, step: i64) -> Result<i64> {
        self.increment(namespace, step)
    }

    fn definition(&self, namespace: &str) -> Result<SegmentDefinition> {
        self.read(namespace)
    }

    fn add_segment(&self, definition: &SegmentDefinition) -> Result<()> {
        self.insert(definition)
    }
}

impl AsyncSegmentStore for MemorySegmentStore {
    async fn increment_max_id_async(&self, namespace: &str, step: i64) -> Result<i64> {
        self.increment(namespace, step)
    }

    async fn definition_async(&self, namespace: &str) -> Result<SegmentDefinition> {
        self.read(namespace)
    }

    async fn add_segment_async(&self, definition: &SegmentDefinition) -> Result<()> {
        self.insert(definition)
    }
}

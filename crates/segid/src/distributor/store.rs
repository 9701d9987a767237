use alloc::{string::String, sync::Arc};
use core::future::Future;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    distributor::{
        AsyncSegmentDistributor, Namespace, SegmentDistributor, clamp_step, ensure_step,
    },
    error::{Error, Result},
};

/// Safe distance used when a namespace does not configure one.
pub const DEFAULT_SAFE_DISTANCE: u32 = 10;

/// A namespace row as stored in the backing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDefinition {
    pub namespace: String,
    /// Largest id reserved so far.
    pub max_id: i64,
    /// Ids reserved per round trip.
    pub step: i64,
    /// Number of segments the prefetcher keeps ahead of consumers.
    pub safe_distance: u32,
}

impl SegmentDefinition {
    pub fn new(namespace: impl Into<String>, max_id: i64, step: i64, safe_distance: u32) -> Self {
        Self {
            namespace: namespace.into(),
            max_id,
            step,
            safe_distance,
        }
    }

    /// Rejects an empty namespace, a negative max id, a non-positive step or
    /// a zero safe distance.
    pub fn validate(&self) -> Result<()> {
        ensure_namespace(&self.namespace)?;
        if self.max_id < 0 {
            return Err(Error::IllegalArgument(format!(
                "max_id:[{}] must not be negative",
                self.max_id
            )));
        }
        ensure_step(self.step)?;
        if self.safe_distance == 0 {
            return Err(Error::IllegalArgument(
                "safe_distance must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn ensure_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(Error::IllegalArgument("namespace can not be empty".into()));
    }
    Ok(())
}

/// Blocking access to the table of namespace counters.
pub trait SegmentStore: Send + Sync {
    /// Atomically adds `step` to the namespace's max id and returns the new
    /// value.
    ///
    /// # Errors
    /// [`Error::SegmentNameMissing`] when no row was affected,
    /// [`Error::Segment`] for driver failures.
    fn increment_max_id(&self, namespace: &str, step: i64) -> Result<i64>;

    /// Reads a namespace row.
    fn definition(&self, namespace: &str) -> Result<SegmentDefinition>;

    /// Inserts a namespace row.
    fn add_segment(&self, definition: &SegmentDefinition) -> Result<()>;
}

/// Future-returning access to the table of namespace counters.
pub trait AsyncSegmentStore: Send + Sync {
    /// See [`SegmentStore::increment_max_id`].
    fn increment_max_id_async(
        &self,
        namespace: &str,
        step: i64,
    ) -> impl Future<Output = Result<i64>> + Send;

    fn definition_async(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<SegmentDefinition>> + Send;

    fn add_segment_async(
        &self,
        definition: &SegmentDefinition,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<S> SegmentStore for Arc<S>
where
    S: SegmentStore + ?Sized,
{
    fn increment_max_id(&self, namespace: &str, step: i64) -> Result<i64> {
        (**self).increment_max_id(namespace, step)
    }

    fn definition(&self, namespace: &str) -> Result<SegmentDefinition> {
        (**self).definition(namespace)
    }

    fn add_segment(&self, definition: &SegmentDefinition) -> Result<()> {
        (**self).add_segment(definition)
    }
}

impl<S> AsyncSegmentStore for Arc<S>
where
    S: AsyncSegmentStore,
{
    fn increment_max_id_async(
        &self,
        namespace: &str,
        step: i64,
    ) -> impl Future<Output = Result<i64>> + Send {
        (**self).increment_max_id_async(namespace, step)
    }

    fn definition_async(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<SegmentDefinition>> + Send {
        (**self).definition_async(namespace)
    }

    fn add_segment_async(
        &self,
        definition: &SegmentDefinition,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).add_segment_async(definition)
    }
}

/// A [`SegmentDistributor`] bound to one namespace of a [`SegmentStore`].
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use segid::{
///     MemorySegmentStore, SegmentDefinition, SegmentDistributor, SegmentStore,
///     StoreSegmentDistributor,
/// };
///
/// let store = Arc::new(MemorySegmentStore::default());
/// store.add_segment(&SegmentDefinition::new("order", 0, 100, 10)).unwrap();
///
/// let distributor = StoreSegmentDistributor::new("order", 100, store).unwrap();
/// assert_eq!(distributor.next_max_id(100).unwrap(), 100);
/// assert_eq!(distributor.next_max_id(100).unwrap(), 200);
/// ```
#[derive(Debug)]
pub struct StoreSegmentDistributor<S> {
    namespace: String,
    step: i64,
    store: S,
}

impl<S> StoreSegmentDistributor<S>
where
    S: SegmentStore,
{
    /// Binds `store` to `namespace`, clamping `step` to
    /// [`MAX_STEP`](crate::MAX_STEP).
    ///
    /// # Errors
    /// [`Error::IllegalArgument`] for an empty namespace or a non-positive
    /// step.
    pub fn new(namespace: impl Into<String>, step: i64, store: S) -> Result<Self> {
        let namespace = namespace.into();
        ensure_namespace(&namespace)?;
        ensure_step(step)?;
        Ok(Self {
            namespace,
            step: clamp_step(step),
            store,
        })
    }

    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S> Namespace for StoreSegmentDistributor<S> {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn step(&self) -> i64 {
        self.step
    }
}

impl<S> SegmentDistributor for StoreSegmentDistributor<S>
where
    S: SegmentStore,
{
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(namespace = %self.namespace)))]
    fn next_max_id(&self, step: i64) -> Result<i64> {
        let step = clamp_step(step);
        ensure_step(step)?;
        self.store.increment_max_id(&self.namespace, step)
    }
}

/// An [`AsyncSegmentDistributor`] bound to one namespace of an
/// [`AsyncSegmentStore`].
#[derive(Debug)]
pub struct AsyncStoreSegmentDistributor<S> {
    namespace: String,
    step: i64,
    store: S,
}

impl<S> AsyncStoreSegmentDistributor<S>
where
    S: AsyncSegmentStore,
{
    /// See [`StoreSegmentDistributor::new`].
    pub fn new(namespace: impl Into<String>, step: i64, store: S) -> Result<Self> {
        let namespace = namespace.into();
        ensure_namespace(&namespace)?;
        ensure_step(step)?;
        Ok(Self {
            namespace,
            step: clamp_step(step),
            store,
        })
    }

    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S> Namespace for AsyncStoreSegmentDistributor<S> {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn step(&self) -> i64 {
        self.step
    }
}

impl<S> AsyncSegmentDistributor for AsyncStoreSegmentDistributor<S>
where
    S: AsyncSegmentStore,
{
    async fn next_max_id_async(&self, step: i64) -> Result<i64> {
        let step = clamp_step(step);
        ensure_step(step)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(namespace = %self.namespace, step, "next_max_id_async");
        self.store
            .increment_max_id_async(&self.namespace, step)
            .await
    }
}

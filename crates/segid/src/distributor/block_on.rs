use tokio::runtime::Handle;

use crate::{
    distributor::{AsyncSegmentDistributor, Namespace, SegmentDistributor},
    error::Result,
};

/// Drives an [`AsyncSegmentDistributor`] from blocking code.
///
/// Prefetch workers are plain threads; this adapter lets them (and the
/// synchronous fallback of the facade) use a non-blocking store by blocking on
/// the given runtime handle.
///
/// Calls must not originate from inside an async context of the same
/// runtime: `Handle::block_on` panics there. Wrap such callers in
/// `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct BlockOn<A> {
    inner: A,
    handle: Handle,
}

impl<A> BlockOn<A>
where
    A: AsyncSegmentDistributor,
{
    pub const fn new(inner: A, handle: Handle) -> Self {
        Self { inner, handle }
    }

    /// Uses the runtime of the calling context.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn current(inner: A) -> Self {
        Self::new(inner, Handle::current())
    }

    pub const fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A> Namespace for BlockOn<A>
where
    A: Namespace,
{
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn step(&self) -> i64 {
        self.inner.step()
    }
}

impl<A> SegmentDistributor for BlockOn<A>
where
    A: AsyncSegmentDistributor,
{
    fn next_max_id(&self, step: i64) -> Result<i64> {
        self.handle.block_on(self.inner.next_max_id_async(step))
    }
}

//! The caller-facing id sequence.
//!
//! [`SegmentChainId`] hands out ids from the head of a [`SegmentChain`]. The
//! fast path is one atomic increment on the head segment. A background
//! prefetch job, bound to one worker of a [`PrefetchWorkerExecutor`], keeps
//! the chain ahead of consumers; a caller only goes to the store itself when
//! every published node is exhausted.

mod job;
#[cfg(test)]
mod tests;

use alloc::sync::Arc;
use core::{cmp::Ordering, fmt};

use arc_swap::ArcSwap;

pub use job::MAX_PREFETCH_DISTANCE;
use job::PrefetchJob;

use crate::{
    concurrent::{AffinityJob, PrefetchWorkerExecutor},
    distributor::{
        DEFAULT_SAFE_DISTANCE, DEFAULT_SEGMENTS, SegmentDistributor, ensure_ttl,
    },
    error::{Error, Result},
    segment::{IdSegment, SEQUENCE_OVERFLOW, SegmentChain},
    time::TIME_TO_LIVE_FOREVER,
};

/// State shared by the facade and its prefetch job.
pub(crate) struct ChainState<D> {
    distributor: D,
    head: ArcSwap<SegmentChain>,
    ttl: i64,
    safe_distance: u32,
}

impl<D> ChainState<D>
where
    D: SegmentDistributor,
{
    fn new(distributor: D, ttl: i64, safe_distance: u32) -> Self {
        Self {
            distributor,
            head: ArcSwap::new(SegmentChain::new_root()),
            ttl,
            safe_distance,
        }
    }

    pub(crate) fn distributor(&self) -> &D {
        &self.distributor
    }

    pub(crate) fn head(&self) -> Arc<SegmentChain> {
        self.head.load_full()
    }

    pub(crate) const fn safe_distance(&self) -> u32 {
        self.safe_distance
    }

    pub(crate) fn next_segment_chain(
        &self,
        previous: &SegmentChain,
        segments: u32,
    ) -> Result<SegmentChain> {
        self.distributor
            .next_segment_chain(previous, segments, self.ttl)
    }

    /// Moves the head to `node` if `node` is further ahead.
    pub(crate) fn forward(&self, node: &Arc<SegmentChain>) {
        let mut current = self.head.load();
        while node.compare(&**current) == Ordering::Greater {
            let previous = self.head.compare_and_swap(&current, Arc::clone(node));
            if Arc::ptr_eq(&*previous, &*current) {
                #[cfg(feature = "tracing")]
                tracing::trace!(namespace = self.distributor.namespace(), head = %node, "head forwarded");
                return;
            }
            current = previous;
        }
    }
}

/// Builder for [`SegmentChainId`].
pub struct SegmentChainIdBuilder<D> {
    distributor: D,
    ttl: i64,
    safe_distance: u32,
    executor: Option<Arc<PrefetchWorkerExecutor>>,
    synchronous: bool,
}

impl<D> SegmentChainIdBuilder<D>
where
    D: SegmentDistributor + 'static,
{
    /// Seconds a fetched segment stays usable. Defaults to
    /// [`TIME_TO_LIVE_FOREVER`].
    #[must_use]
    pub fn ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Segments the prefetcher keeps ahead of the head, and the remaining id
    /// count under which consumers ask for an early refill. Defaults to
    /// [`DEFAULT_SAFE_DISTANCE`].
    #[must_use]
    pub fn safe_distance(mut self, safe_distance: u32) -> Self {
        self.safe_distance = safe_distance;
        self
    }

    /// Runs the prefetch job on `executor` instead of the global one.
    #[must_use]
    pub fn executor(mut self, executor: Arc<PrefetchWorkerExecutor>) -> Self {
        self.executor = Some(executor);
        self.synchronous = false;
        self
    }

    /// Disables background prefetching: every exhausted segment is refilled
    /// on the caller's thread.
    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.executor = None;
        self.synchronous = true;
        self
    }

    /// # Errors
    /// - [`Error::IllegalArgument`] for a non-positive ttl or a zero safe
    ///   distance.
    /// - Whatever [`PrefetchWorkerExecutor::submit`] returns.
    pub fn build(self) -> Result<SegmentChainId<D>> {
        ensure_ttl(self.ttl)?;
        if self.safe_distance == 0 {
            return Err(Error::IllegalArgument(
                "safe_distance must be greater than 0".into(),
            ));
        }

        let chain = Arc::new(ChainState::new(
            self.distributor,
            self.ttl,
            self.safe_distance,
        ));
        if self.synchronous {
            return Ok(SegmentChainId {
                chain,
                prefetch: None,
            });
        }

        let executor = match self.executor {
            Some(executor) => executor,
            None => PrefetchWorkerExecutor::global()?,
        };
        let job = Arc::new(PrefetchJob::new(Arc::clone(&chain)));
        executor.submit(Arc::clone(&job) as Arc<dyn AffinityJob>)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            namespace = chain.distributor.namespace(),
            ttl = self.ttl,
            safe_distance = self.safe_distance,
            "segment chain id started"
        );
        Ok(SegmentChainId {
            chain,
            prefetch: Some(Prefetch { executor, job }),
        })
    }
}

struct Prefetch<D> {
    executor: Arc<PrefetchWorkerExecutor>,
    job: Arc<PrefetchJob<D>>,
}

/// A monotonic, globally unique id sequence for one namespace.
///
/// `next_id` may be called from any number of threads. Ids are unique across
/// every process sharing the backing store, and increasing within each
/// thread.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use segid::{MemorySegmentStore, SegmentChainId, StoreSegmentDistributor};
///
/// let store = Arc::new(MemorySegmentStore::with_namespace("order", 100).unwrap());
/// let distributor = StoreSegmentDistributor::new("order", 100, store).unwrap();
/// let ids = SegmentChainId::builder(distributor).synchronous().build().unwrap();
///
/// assert_eq!(ids.next_id().unwrap(), 1);
/// assert_eq!(ids.next_id().unwrap(), 2);
/// ```
pub struct SegmentChainId<D>
where
    D: SegmentDistributor + 'static,
{
    chain: Arc<ChainState<D>>,
    prefetch: Option<Prefetch<D>>,
}

impl<D> SegmentChainId<D>
where
    D: SegmentDistributor + 'static,
{
    pub fn builder(distributor: D) -> SegmentChainIdBuilder<D> {
        SegmentChainIdBuilder {
            distributor,
            ttl: TIME_TO_LIVE_FOREVER,
            safe_distance: DEFAULT_SAFE_DISTANCE,
            executor: None,
            synchronous: false,
        }
    }

    /// A sequence prefetched by the global executor with default settings.
    pub fn new(distributor: D) -> Result<Self> {
        Self::builder(distributor).build()
    }

    pub fn distributor(&self) -> &D {
        &self.chain.distributor
    }

    pub fn namespace(&self) -> &str {
        self.chain.distributor.namespace()
    }

    /// The node ids are currently drawn from.
    pub fn head(&self) -> Arc<SegmentChain> {
        self.chain.head()
    }

    /// `false` in synchronous mode.
    pub const fn is_prefetching(&self) -> bool {
        self.prefetch.is_some()
    }

    /// Returns the next id.
    ///
    /// Ids are only drawn from nodes that are neither exhausted nor past
    /// their ttl; once every published node is, the caller fetches a fresh
    /// segment itself.
    ///
    /// # Errors
    /// Only when every published segment is exhausted and the synchronous
    /// refill fails: [`Error::SegmentNameMissing`], [`Error::Segment`] or
    /// [`Error::NextIdSegmentExpired`]. No id is consumed by a failed call.
    pub fn next_id(&self) -> Result<i64> {
        loop {
            let head = self.chain.head.load();
            let mut current: &Arc<SegmentChain> = &head;
            loop {
                // An expired node is skipped like an exhausted one.
                if !current.is_expired() {
                    let id = current.increment_and_get();
                    if id != SEQUENCE_OVERFLOW {
                        self.chain.forward(current);
                        self.on_consumed(current);
                        return Ok(id);
                    }
                }
                match current.next() {
                    Some(next) => current = next,
                    None => break,
                }
            }

            let last = Arc::clone(current);
            drop(head);
            self.refill(&last)?;
        }
    }

    fn on_consumed(&self, node: &SegmentChain) {
        let Some(prefetch) = &self.prefetch else {
            return;
        };
        if node.next().is_none() && node.remaining() < i64::from(self.chain.safe_distance) {
            prefetch.executor.wakeup(prefetch.job.as_ref());
        }
    }

    /// Last resort: fetch the successor of `last` on the caller's thread.
    fn refill(&self, last: &Arc<SegmentChain>) -> Result<()> {
        let linked = last
            .try_set_next(|previous| self.chain.next_segment_chain(previous, DEFAULT_SEGMENTS))
            .inspect_err(|_e| {
                #[cfg(feature = "tracing")]
                tracing::warn!(namespace = self.namespace(), error = %_e, "synchronous refill failed");
            })?;
        if linked {
            #[cfg(feature = "tracing")]
            tracing::debug!(namespace = self.namespace(), after = %last, "synchronous refill");
            if let Some(prefetch) = &self.prefetch {
                prefetch.executor.wakeup(prefetch.job.as_ref());
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn job(&self) -> Option<&PrefetchJob<D>> {
        self.prefetch.as_ref().map(|p| p.job.as_ref())
    }
}

impl<D> Drop for SegmentChainId<D>
where
    D: SegmentDistributor + 'static,
{
    fn drop(&mut self) {
        if let Some(prefetch) = &self.prefetch {
            let _ = prefetch.executor.cancel(prefetch.job.job_id());
        }
    }
}

impl<D> fmt::Debug for SegmentChainId<D>
where
    D: SegmentDistributor + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentChainId")
            .field("namespace", &self.namespace())
            .field("head", &format_args!("{}", self.head()))
            .field("prefetching", &self.is_prefetching())
            .finish()
    }
}

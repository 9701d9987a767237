use alloc::{boxed::Box, sync::Arc};
use core::{cmp::Ordering, fmt};
use std::sync::OnceLock;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    error::{Error, Result},
    mutex::{Mutex, lock},
    segment::{IdSegment, Segment},
    time::current_secs,
};

/// Version of the synthetic root node.
pub const ROOT_VERSION: i64 = -1;

/// One node in the append-only allocation history of a namespace.
///
/// A node owns its segment and a write-once link to its successor. Readers
/// follow `next` without locking; the only critical section is the per-node
/// guard inside [`try_set_next`], which decides which caller gets to fetch the
/// successor range. Once published, a link is never replaced.
///
/// Nodes behind the head become unreachable as the head advances and are
/// freed when the last [`Arc`] goes away.
///
/// [`try_set_next`]: SegmentChain::try_set_next
pub struct SegmentChain {
    version: i64,
    segment: Box<dyn IdSegment>,
    next: OnceLock<Arc<SegmentChain>>,
    guard: Mutex<()>,
}

impl SegmentChain {
    pub fn new<S>(version: i64, segment: S) -> Self
    where
        S: IdSegment + 'static,
    {
        Self {
            version,
            segment: Box::new(segment),
            next: OnceLock::new(),
            guard: Mutex::new(()),
        }
    }

    /// Creates the node that follows `previous`.
    pub fn following<S>(previous: &SegmentChain, segment: S) -> Self
    where
        S: IdSegment + 'static,
    {
        Self::new(previous.version + 1, segment)
    }

    /// Creates a root node holding an already exhausted placeholder, so the
    /// first allocation always fetches.
    pub fn new_root() -> Arc<Self> {
        Arc::new(Self::new(ROOT_VERSION, Segment::overflow()))
    }

    pub const fn version(&self) -> i64 {
        self.version
    }

    pub fn segment(&self) -> &dyn IdSegment {
        self.segment.as_ref()
    }

    /// The successor, if one has been published.
    pub fn next(&self) -> Option<&Arc<SegmentChain>> {
        self.next.get()
    }

    /// Publishes the node produced by `supplier` as this node's successor,
    /// unless another caller already did.
    ///
    /// Returns `Ok(true)` only for the caller that performed the publish. The
    /// supplier runs at most once per node across all threads.
    ///
    /// # Errors
    /// - Any error returned by `supplier`.
    /// - [`Error::NextIdSegmentExpired`] if the supplied segment is expired or
    ///   does not move past this one. Nothing is published in that case.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all, fields(version = self.version)))]
    pub fn try_set_next<F>(&self, supplier: F) -> Result<bool>
    where
        F: FnOnce(&SegmentChain) -> Result<SegmentChain>,
    {
        if self.next.get().is_some() {
            return Ok(false);
        }
        let _guard = lock(&self.guard)?;
        if self.next.get().is_some() {
            return Ok(false);
        }
        let next = supplier(self)?;
        self.ensure_next_segment(&next)?;
        self.next
            .set(Arc::new(next))
            .map_err(|_| Error::IllegalState("next segment already published"))?;
        Ok(true)
    }

    /// Walks forward until this caller manages to publish a successor.
    ///
    /// Returns the node whose `next` this caller set; its successor is the
    /// freshly fetched node.
    ///
    /// # Errors
    /// Propagates the first error from [`try_set_next`] without retrying.
    ///
    /// [`try_set_next`]: SegmentChain::try_set_next
    pub fn ensure_set_next<F>(self: &Arc<Self>, mut supplier: F) -> Result<Arc<SegmentChain>>
    where
        F: FnMut(&SegmentChain) -> Result<SegmentChain>,
    {
        let mut current = Arc::clone(self);
        loop {
            if current.try_set_next(&mut supplier)? {
                return Ok(current);
            }
            if let Some(next) = current.next() {
                current = Arc::clone(next);
            }
        }
    }

    /// Number of whole `step`-sized allocations between this node's cursor and
    /// `end`'s upper bound.
    pub fn gap(&self, end: &SegmentChain, step: i64) -> i64 {
        if step <= 0 {
            return 0;
        }
        (end.max_id() - self.sequence()) / step
    }

    /// Follows `next` links to the last published node.
    pub fn last(self: &Arc<Self>) -> Arc<SegmentChain> {
        let mut current = Arc::clone(self);
        while let Some(next) = current.next() {
            current = Arc::clone(next);
        }
        current
    }

    fn ensure_next_segment(&self, next: &SegmentChain) -> Result<()> {
        if next.is_expired_at(current_secs()) || self.compare(next) != Ordering::Less {
            return Err(Error::NextIdSegmentExpired {
                current: self.max_id(),
                next: next.max_id(),
            });
        }
        Ok(())
    }
}

impl IdSegment for SegmentChain {
    fn fetch_time(&self) -> i64 {
        self.segment.fetch_time()
    }

    fn ttl(&self) -> i64 {
        self.segment.ttl()
    }

    fn max_id(&self) -> i64 {
        self.segment.max_id()
    }

    fn step(&self) -> i64 {
        self.segment.step()
    }

    fn sequence(&self) -> i64 {
        self.segment.sequence()
    }

    #[inline]
    fn increment_and_get(&self) -> i64 {
        self.segment.increment_and_get()
    }
}

impl fmt::Debug for SegmentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentChain")
            .field("version", &self.version)
            .field("segment", &self.segment)
            .field("linked", &self.next.get().is_some())
            .finish()
    }
}

impl fmt::Display for SegmentChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{}[{}..={}]@{}",
            self.version,
            self.offset() + 1,
            self.max_id(),
            self.sequence()
        )
    }
}

impl Drop for SegmentChain {
    // Unlink iteratively; a long tail would otherwise drop recursively.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

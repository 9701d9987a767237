use alloc::sync::Arc;
use core::future::Future;

use crate::{
    error::{Error, Result},
    segment::{MergedSegment, Segment, SegmentChain},
    time::current_secs,
};

/// Largest range a single store round trip may reserve.
pub const MAX_STEP: i64 = 5000;

/// Step used when a namespace does not configure one.
pub const DEFAULT_STEP: i64 = 100;

/// Segment count that produces a plain [`Segment`] instead of a
/// [`MergedSegment`].
pub const DEFAULT_SEGMENTS: u32 = 1;

/// Rejects a non-positive step.
pub fn ensure_step(step: i64) -> Result<()> {
    if step <= 0 {
        return Err(Error::IllegalArgument(format!(
            "step:[{step}] must be greater than 0"
        )));
    }
    Ok(())
}

/// Caps `step` at [`MAX_STEP`].
pub const fn clamp_step(step: i64) -> i64 {
    if step > MAX_STEP { MAX_STEP } else { step }
}

pub(crate) fn ensure_ttl(ttl: i64) -> Result<()> {
    if ttl <= 0 {
        return Err(Error::IllegalArgument(format!(
            "ttl:[{ttl}] must be greater than 0"
        )));
    }
    Ok(())
}

/// Resolves how many `single_step` segments fit into one clamped fetch.
///
/// Returns the segment count actually used and the total step to reserve.
/// The count shrinks (never below one) so the total never exceeds
/// [`MAX_STEP`]; the segment built from the fetch therefore always describes
/// exactly the range the store reserved.
pub(crate) fn merged_step(single_step: i64, segments: u32) -> Result<(u32, i64)> {
    ensure_step(single_step)?;
    if segments == 0 {
        return Err(Error::IllegalArgument(
            "segments:[0] must be greater than 0".into(),
        ));
    }
    let fit = (MAX_STEP / single_step).max(1);
    let segments = i64::from(segments).min(fit);
    Ok((segments as u32, clamp_step(single_step * segments)))
}

/// The namespace and step a distributor allocates for.
pub trait Namespace {
    /// Non-empty namespace (store row key).
    fn namespace(&self) -> &str;

    /// Size of one segment, already clamped to [`MAX_STEP`].
    fn step(&self) -> i64;
}

/// Fetches the next raw range of a namespace from a backing store with a
/// blocking round trip.
///
/// Implementations perform an atomic "increase the stored max by `step`, then
/// read the new max" exactly once per call. The provided methods wrap that
/// result into segments stamped with the current second.
pub trait SegmentDistributor: Namespace + Send + Sync {
    /// Reserves `step` ids (clamped to [`MAX_STEP`]) and returns the new
    /// inclusive maximum.
    ///
    /// # Errors
    /// - [`Error::SegmentNameMissing`] if the namespace row does not exist.
    /// - [`Error::Segment`] for any other store failure.
    /// - [`Error::IllegalArgument`] for a non-positive step.
    fn next_max_id(&self, step: i64) -> Result<i64>;

    fn next_id_segment(&self, ttl: i64) -> Result<Segment> {
        ensure_ttl(ttl)?;
        let step = clamp_step(self.step());
        let max_id = self.next_max_id(step)?;
        Ok(Segment::new(max_id, step, current_secs(), ttl))
    }

    /// Reserves up to `segments` steps in one round trip.
    ///
    /// The count may be reduced so the total stays within [`MAX_STEP`].
    fn next_merged_segment(&self, segments: u32, ttl: i64) -> Result<MergedSegment> {
        ensure_ttl(ttl)?;
        let (segments, total_step) = merged_step(self.step(), segments)?;
        let max_id = self.next_max_id(total_step)?;
        MergedSegment::new(
            segments,
            Segment::new(max_id, total_step, current_secs(), ttl),
        )
    }

    /// Fetches a range and wraps it as the node following `previous`.
    fn next_segment_chain(
        &self,
        previous: &SegmentChain,
        segments: u32,
        ttl: i64,
    ) -> Result<SegmentChain> {
        if segments == DEFAULT_SEGMENTS {
            let segment = self.next_id_segment(ttl)?;
            return Ok(SegmentChain::following(previous, segment));
        }
        let segment = self.next_merged_segment(segments, ttl)?;
        Ok(SegmentChain::following(previous, segment))
    }
}

/// Non-blocking counterpart of [`SegmentDistributor`].
///
/// Validation, clamping and the increment-then-read contract are identical;
/// only the transport differs.
pub trait AsyncSegmentDistributor: Namespace + Send + Sync {
    /// Reserves `step` ids (clamped to [`MAX_STEP`]) and resolves to the new
    /// inclusive maximum.
    ///
    /// # Errors
    /// Same as [`SegmentDistributor::next_max_id`].
    fn next_max_id_async(&self, step: i64) -> impl Future<Output = Result<i64>> + Send;

    fn next_id_segment_async(&self, ttl: i64) -> impl Future<Output = Result<Segment>> + Send {
        async move {
            ensure_ttl(ttl)?;
            let step = clamp_step(self.step());
            let max_id = self.next_max_id_async(step).await?;
            Ok(Segment::new(max_id, step, current_secs(), ttl))
        }
    }

    fn next_merged_segment_async(
        &self,
        segments: u32,
        ttl: i64,
    ) -> impl Future<Output = Result<MergedSegment>> + Send {
        async move {
            ensure_ttl(ttl)?;
            let (segments, total_step) = merged_step(self.step(), segments)?;
            let max_id = self.next_max_id_async(total_step).await?;
            MergedSegment::new(
                segments,
                Segment::new(max_id, total_step, current_secs(), ttl),
            )
        }
    }

    fn next_segment_chain_async(
        &self,
        previous: &SegmentChain,
        segments: u32,
        ttl: i64,
    ) -> impl Future<Output = Result<SegmentChain>> + Send {
        async move {
            if segments == DEFAULT_SEGMENTS {
                let segment = self.next_id_segment_async(ttl).await?;
                return Ok(SegmentChain::following(previous, segment));
            }
            let segment = self.next_merged_segment_async(segments, ttl).await?;
            Ok(SegmentChain::following(previous, segment))
        }
    }
}

impl<D> Namespace for Arc<D>
where
    D: Namespace + ?Sized,
{
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn step(&self) -> i64 {
        (**self).step()
    }
}

impl<D> SegmentDistributor for Arc<D>
where
    D: SegmentDistributor + ?Sized,
{
    fn next_max_id(&self, step: i64) -> Result<i64> {
        (**self).next_max_id(step)
    }
}

use core::ops::RangeInclusive;

use crate::{
    error::{Error, Result},
    segment::{IdSegment, Segment},
};

/// A segment fetched with `step = single_step * segments`.
///
/// Every [`IdSegment`] operation is delegated to the wrapped segment
/// unchanged. The extra capability is carving the range into `segments`
/// non-overlapping sub-ranges of `single_step` values each, so that several
/// logical shards of one namespace can be served from a single store round
/// trip. Any remainder of `step / segments` is left unused.
///
/// The fetch time and TTL of the wrapped segment apply to the whole merged
/// range.
#[derive(Debug)]
pub struct MergedSegment {
    segments: u32,
    single_step: i64,
    segment: Segment,
}

impl MergedSegment {
    /// Wraps `segment` as `segments` equal sub-ranges.
    ///
    /// # Errors
    /// Returns [`Error::IllegalArgument`] if `segments` is zero.
    pub fn new(segments: u32, segment: Segment) -> Result<Self> {
        if segments == 0 {
            return Err(Error::IllegalArgument(
                "segments must be greater than 0".into(),
            ));
        }
        let single_step = segment.step() / i64::from(segments);
        Ok(Self {
            segments,
            single_step,
            segment,
        })
    }

    pub const fn segments(&self) -> u32 {
        self.segments
    }

    /// Size of each sub-range.
    pub const fn single_step(&self) -> i64 {
        self.single_step
    }

    /// The `index`-th sub-range, or `None` past the last one.
    pub fn sub_range(&self, index: u32) -> Option<RangeInclusive<i64>> {
        if index >= self.segments || self.single_step == 0 {
            return None;
        }
        let start = self.segment.offset() + i64::from(index) * self.single_step + 1;
        Some(start..=start + self.single_step - 1)
    }

    /// All sub-ranges in ascending order.
    pub fn sub_ranges(&self) -> impl Iterator<Item = RangeInclusive<i64>> + '_ {
        (0..self.segments).filter_map(|index| self.sub_range(index))
    }

    pub fn into_inner(self) -> Segment {
        self.segment
    }
}

impl IdSegment for MergedSegment {
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

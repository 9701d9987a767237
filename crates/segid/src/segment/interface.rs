use core::{cmp::Ordering, fmt};

use crate::time::{TIME_TO_LIVE_FOREVER, current_secs};

/// Sentinel returned by [`IdSegment::increment_and_get`] once a segment is
/// exhausted.
pub const SEQUENCE_OVERFLOW: i64 = -1;

/// One allocated numeric range `[offset + 1, max_id]` plus an in-range
/// cursor.
///
/// Implementations must only ever move the cursor forward. Once the cursor
/// passes `max_id` every call to [`increment_and_get`] yields
/// [`SEQUENCE_OVERFLOW`], which tells the chain to move on to the next node.
///
/// [`increment_and_get`]: IdSegment::increment_and_get
pub trait IdSegment: Send + Sync + fmt::Debug {
    /// Second at which the range was fetched from the store.
    fn fetch_time(&self) -> i64;

    /// Time to live in seconds, or [`TIME_TO_LIVE_FOREVER`].
    fn ttl(&self) -> i64;

    /// Inclusive upper bound of the range.
    fn max_id(&self) -> i64;

    /// Size of the range.
    fn step(&self) -> i64;

    /// Next value to hand out.
    fn sequence(&self) -> i64;

    /// Returns the current sequence and advances it, or
    /// [`SEQUENCE_OVERFLOW`] once the range is exhausted.
    fn increment_and_get(&self) -> i64;

    /// Exclusive lower bound of the range.
    fn offset(&self) -> i64 {
        self.max_id() - self.step()
    }

    /// Values left in the range. Negative once concurrent callers raced past
    /// the bound.
    fn remaining(&self) -> i64 {
        self.max_id() - self.sequence() + 1
    }

    fn is_overflow(&self) -> bool {
        self.sequence() > self.max_id()
    }

    /// Whether the range is stale at second `now`.
    fn is_expired_at(&self, now: i64) -> bool {
        self.ttl() != TIME_TO_LIVE_FOREVER && now - self.fetch_time() > self.ttl()
    }

    fn is_expired(&self) -> bool {
        self.is_expired_at(current_secs())
    }

    /// Not expired and not exhausted.
    fn is_available(&self) -> bool {
        !self.is_expired() && !self.is_overflow()
    }

    /// Orders segments by their upper bound.
    fn compare(&self, other: &dyn IdSegment) -> Ordering {
        self.max_id().cmp(&other.max_id())
    }
}

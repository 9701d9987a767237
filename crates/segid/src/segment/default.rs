use portable_atomic::{AtomicI64, Ordering};

use crate::{
    segment::{IdSegment, SEQUENCE_OVERFLOW},
    time::TIME_TO_LIVE_FOREVER,
};

/// A single store-allocated range with a lock-free cursor.
///
/// The cursor starts at `max_id - step + 1` and is advanced with a single
/// `fetch_add`, so any number of threads can draw from the same segment.
///
/// # Example
/// ```
/// use segid::{IdSegment, SEQUENCE_OVERFLOW, Segment, TIME_TO_LIVE_FOREVER};
///
/// let segment = Segment::new(3, 3, 0, TIME_TO_LIVE_FOREVER);
/// assert_eq!(segment.increment_and_get(), 1);
/// assert_eq!(segment.increment_and_get(), 2);
/// assert_eq!(segment.increment_and_get(), 3);
/// assert_eq!(segment.increment_and_get(), SEQUENCE_OVERFLOW);
/// ```
#[derive(Debug)]
pub struct Segment {
    max_id: i64,
    step: i64,
    fetch_time: i64,
    ttl: i64,
    #[cfg(feature = "cache-padded")]
    sequence: crossbeam_utils::CachePadded<AtomicI64>,
    #[cfg(not(feature = "cache-padded"))]
    sequence: AtomicI64,
}

impl Segment {
    /// Creates the segment `[max_id - step + 1, max_id]`.
    pub fn new(max_id: i64, step: i64, fetch_time: i64, ttl: i64) -> Self {
        debug_assert!(step >= 0);
        debug_assert!(ttl > 0);
        let start = max_id - step + 1;
        Self {
            max_id,
            step,
            fetch_time,
            ttl,
            #[cfg(feature = "cache-padded")]
            sequence: crossbeam_utils::CachePadded::new(AtomicI64::new(start)),
            #[cfg(not(feature = "cache-padded"))]
            sequence: AtomicI64::new(start),
        }
    }

    /// An empty, already exhausted segment that never expires.
    ///
    /// Used as the placeholder of a chain root so that the first real
    /// allocation always goes to the store.
    pub fn overflow() -> Self {
        Self::new(0, 0, 0, TIME_TO_LIVE_FOREVER)
    }
}

impl IdSegment for Segment {
    fn fetch_time(&self) -> i64 {
        self.fetch_time
    }

    fn ttl(&self) -> i64 {
        self.ttl
    }

    fn max_id(&self) -> i64 {
        self.max_id
    }

    fn step(&self) -> i64 {
        self.step
    }

    fn sequence(&self) -> i64 {
        self.sequence.load(Ordering::Acquire)
    }

    #[inline]
    fn increment_and_get(&self) -> i64 {
        // Stop bumping once exhausted so the cursor stays near `max_id`.
        if self.is_overflow() {
            return SEQUENCE_OVERFLOW;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        if sequence > self.max_id {
            SEQUENCE_OVERFLOW
        } else {
            sequence
        }
    }
}

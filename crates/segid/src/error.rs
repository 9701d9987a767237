//! Error types for segment allocation.
//!
//! ## Error Cases
//! - `SegmentNameMissing`: the namespace has no row in the backing store.
//!   Fatal for that namespace until the row is created; never retried
//!   automatically.
//! - `NextIdSegmentExpired`: a freshly fetched segment was stale (or not ahead
//!   of its predecessor) by the time it would have been linked into the chain.
//! - `Segment`: any other store or transport failure. Background prefetches
//!   log it and retry on the next wake-up; the synchronous fallback in
//!   [`SegmentChainId::next_id`] returns it to the caller.
//! - `IllegalState`: the operation is not allowed in the current state, e.g.
//!   submitting to a shut down executor.
//! - `IllegalArgument`: a configuration value was rejected.
//! - `Io`: a worker thread could not be spawned or the shutdown hook could
//!   not be installed.
//!
//! [`SegmentChainId::next_id`]: crate::SegmentChainId::next_id

use alloc::boxed::Box;
use alloc::string::String;

/// Boxed error from a store driver.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// A result type defaulting to [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `segid` can emit.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The namespace does not exist in the backing store (zero rows affected).
    #[error("segment name missing: [{namespace}]")]
    SegmentNameMissing { namespace: String },

    /// The candidate next segment is already expired, or does not move past
    /// the segment it would follow.
    #[error("next id segment expired: current [{current}] -> next [{next}]")]
    NextIdSegmentExpired { current: i64, next: i64 },

    /// Store or transport failure.
    #[error("segment store failure: {0}")]
    Segment(#[source] BoxError),

    /// The operation was rejected because of the current lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),

    /// A configuration or call argument was rejected.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Spawning a worker thread or registering a signal handler failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation failed because a lock was **poisoned**.
    ///
    /// This occurs when a thread panics while holding the lock. When the
    /// `parking-lot` feature is enabled, mutexes do **not** poison, so this
    /// variant is not available.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Wraps a driver error as a generic [`Error::Segment`].
    pub fn segment<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Segment(err.into())
    }

    /// Returns `true` for failures a later attempt may recover from.
    ///
    /// A missing namespace and rejected arguments stay broken until fixed
    /// externally.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Segment(_) | Self::NextIdSegmentExpired { .. }
        )
    }
}

#[cfg(not(feature = "parking-lot"))]
use crate::mutex::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::segment(err)
    }
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::segment(err)
    }
}

use core::time::Duration;

#[cfg(not(feature = "parking-lot"))]
pub use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "parking-lot")]
pub use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::Result;

/// Acquires `mutex`, mapping poisoning to [`crate::Error::LockPoisoned`].
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    #[cfg(feature = "parking-lot")]
    {
        Ok(mutex.lock())
    }
    #[cfg(not(feature = "parking-lot"))]
    {
        Ok(mutex.lock()?)
    }
}

/// Blocks on `condvar` for at most `timeout`, returning the re-acquired guard.
pub(crate) fn wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> Result<MutexGuard<'a, T>> {
    #[cfg(feature = "parking-lot")]
    {
        let mut guard = guard;
        condvar.wait_for(&mut guard, timeout);
        Ok(guard)
    }
    #[cfg(not(feature = "parking-lot"))]
    {
        condvar
            .wait_timeout(guard, timeout)
            .map(|(guard, _)| guard)
            .map_err(|_| crate::Error::LockPoisoned)
    }
}

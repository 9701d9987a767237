use std::{
    sync::{Arc, OnceLock},
    thread::{self, JoinHandle},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use portable_atomic::{AtomicI64, Ordering};

/// TTL marking a segment that never expires.
pub const TIME_TO_LIVE_FOREVER: i64 = i64::MAX;

/// How often the shared ticker refreshes its cached second.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// A trait for time sources that return the current wall-clock second.
///
/// Segments are stamped with, and expire against, whole seconds since the
/// Unix epoch.
///
/// # Example
///
/// ```
/// use segid::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_secs(&self) -> i64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_secs(), 1234);
/// ```
pub trait TimeSource {
    /// Returns whole seconds since the Unix epoch.
    fn current_secs(&self) -> i64;
}

/// Reads the system clock on every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_secs(&self) -> i64 {
        system_secs()
    }
}

fn system_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

/// Shared ticker thread that refreshes the cached second.
struct SharedTickerInner {
    current: AtomicI64,
    _handle: OnceLock<JoinHandle<()>>,
}

/// A second-resolution clock served from an atomic that a background ticker
/// keeps up to date.
///
/// Reads are a single atomic load, which keeps expiry checks off the syscall
/// path. The cached value never moves backwards even if the system clock is
/// adjusted. The ticker thread exits once the last clone is dropped.
#[derive(Clone)]
pub struct CachedClock {
    inner: Arc<SharedTickerInner>,
}

impl Default for CachedClock {
    fn default() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }
}

impl CachedClock {
    /// Constructs a cached clock whose ticker refreshes every `tick`.
    pub fn with_tick(tick: Duration) -> Self {
        let inner = Arc::new(SharedTickerInner {
            current: AtomicI64::new(system_secs()),
            _handle: OnceLock::new(),
        });

        let weak_inner = Arc::downgrade(&inner);
        let handle = thread::spawn(move || {
            loop {
                thread::sleep(tick);
                let Some(inner_ref) = weak_inner.upgrade() else {
                    break;
                };
                inner_ref.current.fetch_max(system_secs(), Ordering::Release);
            }
        });

        let _ = inner._handle.set(handle);

        Self { inner }
    }
}

impl TimeSource for CachedClock {
    fn current_secs(&self) -> i64 {
        self.inner.current.load(Ordering::Acquire)
    }
}

static CLOCK: OnceLock<CachedClock> = OnceLock::new();

/// Returns the process-wide cached second.
///
/// Segment fetch times, expiry checks and hunger timestamps all read this
/// clock so they agree with each other.
pub fn current_secs() -> i64 {
    CLOCK.get_or_init(CachedClock::default).current_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_clock_tracks_system_clock() {
        let clock = CachedClock::with_tick(Duration::from_millis(5));
        let cached = clock.current_secs();
        let system = SystemClock.current_secs();
        assert!((system - cached).abs() <= 1);
    }

    #[test]
    fn cached_clock_never_goes_backwards() {
        let clock = CachedClock::with_tick(Duration::from_millis(1));
        let mut last = clock.current_secs();
        for _ in 0..20 {
            thread::sleep(Duration::from_millis(2));
            let now = clock.current_secs();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn global_clock_is_shared() {
        let a = current_secs();
        let b = current_secs();
        assert!(b >= a);
    }
}

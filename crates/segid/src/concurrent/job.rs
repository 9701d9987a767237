use alloc::sync::Arc;
use core::fmt;
use std::sync::OnceLock;

use portable_atomic::{AtomicBool, AtomicI64, Ordering};

use crate::{concurrent::PrefetchWorker, error::Result, time::current_secs};

/// Seconds after a [`wakeup`](Affinity::hungry) during which a job counts as
/// hungry.
pub const HUNGER_THRESHOLD_SECS: i64 = 1;

/// Background work pinned to exactly one [`PrefetchWorker`].
///
/// All runs of one job happen on its bound worker's thread, one after the
/// other, so a job never races with itself.
pub trait AffinityJob: Send + Sync {
    /// Stable identity of the job, usually the namespace it refills.
    fn job_id(&self) -> &str;

    /// Performs one round of work. Errors are logged by the worker and the
    /// job is retried on the next wake-up.
    fn run(&self) -> Result<()>;

    /// Binding and hunger bookkeeping.
    fn affinity(&self) -> &Affinity;
}

/// Per-job scheduling state: the worker the job is bound to and the last
/// time a consumer asked for an early refill.
///
/// A binding is permanent. Once cancelled, a job cannot be submitted again.
#[derive(Default)]
pub struct Affinity {
    hunger_time: AtomicI64,
    worker: OnceLock<Arc<PrefetchWorker>>,
    cancelled: AtomicBool,
}

impl Affinity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Second of the last [`hungry`](Self::hungry) call, or zero.
    pub fn hunger_time(&self) -> i64 {
        self.hunger_time.load(Ordering::Acquire)
    }

    /// Records that a consumer is about to run dry.
    pub fn hungry(&self) {
        self.hunger_time.store(current_secs(), Ordering::Release);
    }

    /// Whether the last hunger signal is recent at second `now`.
    pub fn is_hungry_at(&self, now: i64) -> bool {
        let hunger_time = self.hunger_time();
        hunger_time > 0 && now - hunger_time <= HUNGER_THRESHOLD_SECS
    }

    pub fn is_hungry(&self) -> bool {
        self.is_hungry_at(current_secs())
    }

    /// The bound worker, once the job has been submitted.
    pub fn worker(&self) -> Option<&Arc<PrefetchWorker>> {
        self.worker.get()
    }

    /// Binds the job to `worker`. Returns `false` if it was already bound.
    pub(crate) fn bind(&self, worker: &Arc<PrefetchWorker>) -> bool {
        self.worker.set(Arc::clone(worker)).is_ok()
    }

    /// Whether the job was cancelled on its executor.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Affinity")
            .field("hunger_time", &self.hunger_time())
            .field("worker", &self.worker().map(|w| w.name()))
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

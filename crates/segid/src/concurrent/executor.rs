//! Affinity worker pool for background segment prefetching.
//!
//! A [`PrefetchWorkerExecutor`] owns a fixed set of [`PrefetchWorker`]s. Each
//! submitted [`AffinityJob`] is bound to one worker, picked round-robin, for
//! its whole lifetime, so all background work of one namespace runs serially
//! on one thread while unrelated namespaces spread across the pool.
//!
//! Bindings live in one map behind one lock. Binding happens once per job and
//! is short; the hot [`wakeup`](PrefetchWorkerExecutor::wakeup) path goes
//! through the job's own [`Affinity`](crate::Affinity) and never takes it.

use alloc::{format, string::String, sync::Arc, vec::Vec};
use core::time::Duration;
use std::{
    collections::HashMap,
    sync::{
        OnceLock,
        atomic::{AtomicBool as SharedFlag, Ordering as SharedOrdering},
    },
};

use portable_atomic::{AtomicUsize, Ordering};
use signal_hook::{SigId, consts::TERM_SIGNALS, low_level};

use crate::{
    concurrent::{AffinityJob, PrefetchWorker},
    error::{Error, Result},
    mutex::{Mutex, lock},
};

/// How long an idle worker parks between rounds.
pub const DEFAULT_PREFETCH_PERIOD: Duration = Duration::from_secs(1);

/// A fixed pool of prefetch workers with sticky job placement.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use segid::PrefetchWorkerExecutor;
///
/// let executor = PrefetchWorkerExecutor::new(Duration::from_millis(100), 2, false).unwrap();
/// assert_eq!(executor.core_pool_size(), 2);
/// executor.shutdown();
/// assert!(executor.is_shutdown());
/// ```
pub struct PrefetchWorkerExecutor {
    prefetch_period: Duration,
    workers: Vec<Arc<PrefetchWorker>>,
    bindings: Mutex<HashMap<String, Arc<PrefetchWorker>>>,
    next_worker: AtomicUsize,
    shutdown: Arc<SharedFlag>,
    signals: Vec<SigId>,
}

impl PrefetchWorkerExecutor {
    /// Creates a pool of `core_pool_size` workers. No thread is spawned until
    /// a job is submitted to it.
    ///
    /// With `shutdown_hook` set, SIGINT, SIGQUIT and SIGTERM raise the
    /// shutdown flag and then terminate the process as they would without
    /// the hook.
    ///
    /// # Errors
    /// - [`Error::IllegalArgument`] for a zero pool size or period.
    /// - [`Error::Io`] if the signal handlers cannot be installed.
    pub fn new(prefetch_period: Duration, core_pool_size: usize, shutdown_hook: bool) -> Result<Self> {
        if core_pool_size == 0 {
            return Err(Error::IllegalArgument(
                "core_pool_size must be greater than 0".into(),
            ));
        }
        if prefetch_period.is_zero() {
            return Err(Error::IllegalArgument(
                "prefetch_period must be greater than 0".into(),
            ));
        }

        let shutdown = Arc::new(SharedFlag::new(false));
        let workers = (0..core_pool_size)
            .map(|i| {
                Arc::new(PrefetchWorker::new(
                    format!("prefetch-worker-{i}"),
                    prefetch_period,
                    Arc::clone(&shutdown),
                ))
            })
            .collect();

        let mut signals = Vec::new();
        if shutdown_hook {
            for &signal in TERM_SIGNALS {
                let flag = Arc::clone(&shutdown);
                // SAFETY: the action only stores to an atomic and then
                // re-raises the signal with its default disposition, both of
                // which are async-signal-safe.
                let id = unsafe {
                    low_level::register(signal, move || {
                        flag.store(true, SharedOrdering::Release);
                        let _ = low_level::emulate_default_handler(signal);
                    })
                }?;
                signals.push(id);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(core_pool_size, ?prefetch_period, shutdown_hook, "prefetch executor created");

        Ok(Self {
            prefetch_period,
            workers,
            bindings: Mutex::new(HashMap::new()),
            next_worker: AtomicUsize::new(0),
            shutdown,
            signals,
        })
    }

    /// The lazily created process-wide executor: one worker per CPU, a one
    /// second period and the signal hook installed.
    ///
    /// # Errors
    /// Fails if the first construction fails; later calls retry.
    pub fn global() -> Result<Arc<Self>> {
        static GLOBAL: OnceLock<Arc<PrefetchWorkerExecutor>> = OnceLock::new();
        if let Some(executor) = GLOBAL.get() {
            return Ok(Arc::clone(executor));
        }
        let executor = Arc::new(Self::new(DEFAULT_PREFETCH_PERIOD, num_cpus::get(), true)?);
        Ok(Arc::clone(GLOBAL.get_or_init(|| executor)))
    }

    pub const fn prefetch_period(&self) -> Duration {
        self.prefetch_period
    }

    pub fn core_pool_size(&self) -> usize {
        self.workers.len()
    }

    pub fn workers(&self) -> &[Arc<PrefetchWorker>] {
        &self.workers
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(SharedOrdering::Acquire)
    }

    fn choose_worker(&self) -> &Arc<PrefetchWorker> {
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[index]
    }

    /// Binds `job` to a worker and makes sure that worker is started.
    ///
    /// Resubmitting an already bound job is a no-op.
    ///
    /// # Errors
    /// - [`Error::IllegalState`] once the executor is shut down, or if the
    ///   job was cancelled; nothing is bound in either case.
    /// - [`Error::IllegalArgument`] if a different job with the same id is
    ///   already bound.
    /// - [`Error::Io`] if the worker thread cannot be spawned.
    pub fn submit(&self, job: Arc<dyn AffinityJob>) -> Result<()> {
        if self.is_shutdown() {
            return Err(Error::IllegalState("prefetch executor is shut down"));
        }
        if job.affinity().is_cancelled() {
            return Err(Error::IllegalState("prefetch job was cancelled"));
        }
        if job.affinity().worker().is_some() {
            return Ok(());
        }

        let mut bindings = lock(&self.bindings)?;
        if self.is_shutdown() {
            return Err(Error::IllegalState("prefetch executor is shut down"));
        }
        if job.affinity().is_cancelled() {
            return Err(Error::IllegalState("prefetch job was cancelled"));
        }
        if job.affinity().worker().is_some() {
            return Ok(());
        }
        if bindings.contains_key(job.job_id()) {
            return Err(Error::IllegalArgument(format!(
                "job:[{}] is already bound by another job",
                job.job_id()
            )));
        }

        let worker = Arc::clone(self.choose_worker());
        worker.start()?;
        if !job.affinity().bind(&worker) {
            return Ok(());
        }
        bindings.insert(job.job_id().into(), Arc::clone(&worker));
        worker.add_job(Arc::clone(&job))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(job = job.job_id(), worker = worker.name(), "prefetch job bound");
        Ok(())
    }

    /// Asks the job's worker to run early.
    pub fn wakeup(&self, job: &dyn AffinityJob) {
        job.affinity().hungry();
        if let Some(worker) = job.affinity().worker() {
            worker.wakeup();
        }
    }

    /// Unbinds a job; its worker stops running it from the next round on.
    /// A cancelled job is terminal: submitting it again is rejected.
    ///
    /// Returns `false` if no job with that id was bound.
    pub fn cancel(&self, job_id: &str) -> Result<bool> {
        let mut bindings = lock(&self.bindings)?;
        let Some(worker) = bindings.remove(job_id) else {
            return Ok(false);
        };
        let removed = worker.remove_job(job_id)?;
        if let Some(job) = &removed {
            job.affinity().cancel();
        }
        drop(bindings);

        #[cfg(feature = "tracing")]
        tracing::debug!(job = job_id, worker = worker.name(), "prefetch job cancelled");
        Ok(removed.is_some())
    }

    /// Number of bound jobs.
    pub fn job_count(&self) -> usize {
        lock(&self.bindings).map_or(0, |bindings| bindings.len())
    }

    /// Stops accepting jobs and releases every worker. Cooperative: a round
    /// already in progress finishes its current job first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, SharedOrdering::Release);

        #[cfg(feature = "tracing")]
        tracing::debug!(workers = self.workers.len(), "prefetch executor shutting down");

        if let Ok(mut bindings) = lock(&self.bindings) {
            bindings.clear();
        }
        for worker in &self.workers {
            worker.notify_shutdown();
        }
    }
}

impl Drop for PrefetchWorkerExecutor {
    fn drop(&mut self) {
        self.shutdown();
        for id in self.signals.drain(..) {
            low_level::unregister(id);
        }
    }
}

impl core::fmt::Debug for PrefetchWorkerExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrefetchWorkerExecutor")
            .field("prefetch_period", &self.prefetch_period)
            .field("workers", &self.workers)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

use alloc::{
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::{fmt, time::Duration};
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::atomic::AtomicBool as SharedFlag,
    thread::{self, JoinHandle},
};

use portable_atomic::{AtomicBool, Ordering};

use crate::{
    concurrent::AffinityJob,
    error::Result,
    mutex::{Condvar, Mutex, lock, wait_timeout},
};

#[derive(Default)]
struct WorkerState {
    jobs: Vec<Arc<dyn AffinityJob>>,
    woken: bool,
}

/// A long-lived thread that serially runs the jobs bound to it.
///
/// The loop runs every bound job, then parks on a condition variable for up
/// to `period`. [`wakeup`](Self::wakeup) cuts the park short. The thread is
/// spawned on the first [`start`](Self::start) and exits once the shared
/// shutdown flag is raised or the worker itself is dropped.
pub struct PrefetchWorker {
    name: String,
    period: Duration,
    state: Mutex<WorkerState>,
    signal: Condvar,
    running: AtomicBool,
    shutdown: Arc<SharedFlag>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PrefetchWorker {
    pub(crate) fn new(name: String, period: Duration, shutdown: Arc<SharedFlag>) -> Self {
        Self {
            name,
            period,
            state: Mutex::new(WorkerState::default()),
            signal: Condvar::new(),
            running: AtomicBool::new(false),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// `true` while the worker is executing its jobs, as opposed to parked.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        lock(&self.handle).is_ok_and(|handle| handle.is_some())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(core::sync::atomic::Ordering::Acquire)
    }

    /// Number of jobs bound to this worker.
    pub fn job_count(&self) -> usize {
        lock(&self.state).map_or(0, |state| state.jobs.len())
    }

    pub(crate) fn add_job(&self, job: Arc<dyn AffinityJob>) -> Result<()> {
        lock(&self.state)?.jobs.push(job);
        Ok(())
    }

    pub(crate) fn remove_job(&self, job_id: &str) -> Result<Option<Arc<dyn AffinityJob>>> {
        let mut state = lock(&self.state)?;
        Ok(state
            .jobs
            .iter()
            .position(|job| job.job_id() == job_id)
            .map(|index| state.jobs.remove(index)))
    }

    /// Spawns the worker thread unless it is already running.
    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        let mut handle = lock(&self.handle)?;
        if handle.is_some() {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || Self::run_loop(&weak))?;
        *handle = Some(spawned);

        #[cfg(feature = "tracing")]
        tracing::debug!(worker = %self.name, period = ?self.period, "prefetch worker started");
        Ok(())
    }

    /// Cuts the current park short.
    ///
    /// A no-op while the worker is running its jobs: the in-flight round
    /// already covers the request, and a second round would fetch again.
    pub fn wakeup(&self) {
        if self.is_running() {
            return;
        }
        let Ok(mut state) = lock(&self.state) else {
            return;
        };
        state.woken = true;
        self.signal.notify_one();

        #[cfg(feature = "tracing")]
        tracing::trace!(worker = %self.name, "prefetch worker woken");
    }

    /// Releases a parked worker so it observes the shutdown flag.
    pub(crate) fn notify_shutdown(&self) {
        if let Ok(mut state) = lock(&self.state) {
            state.woken = true;
            state.jobs.clear();
        }
        self.signal.notify_all();
    }

    fn run_loop(weak: &Weak<Self>) {
        loop {
            let Some(worker) = weak.upgrade() else {
                break;
            };
            if worker.is_shutdown() {
                break;
            }
            worker.run_jobs();
            if worker.park().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!(worker = %worker.name, "prefetch worker lock poisoned, exiting");
                break;
            }
        }
    }

    fn run_jobs(&self) {
        let jobs = match lock(&self.state) {
            Ok(state) => state.jobs.clone(),
            Err(_) => return,
        };
        self.running.store(true, Ordering::Release);
        for job in jobs {
            if self.is_shutdown() {
                break;
            }
            match catch_unwind(AssertUnwindSafe(|| job.run())) {
                Ok(Ok(())) => {}
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(worker = %self.name, job = job.job_id(), error = %_e, "prefetch job failed");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(worker = %self.name, job = job.job_id(), "prefetch job panicked");
                }
            }
        }
        self.running.store(false, Ordering::Release);
    }

    fn park(&self) -> Result<()> {
        let mut state = lock(&self.state)?;
        if !state.woken && !self.is_shutdown() {
            state = wait_timeout(&self.signal, state, self.period)?;
        }
        state.woken = false;
        Ok(())
    }
}

impl fmt::Debug for PrefetchWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchWorker")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("running", &self.is_running())
            .field("jobs", &self.job_count())
            .finish()
    }
}

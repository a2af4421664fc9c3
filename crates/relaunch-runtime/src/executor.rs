//! Leak-safe executor
//!
//! Runs restart work on short-lived worker threads. A worker serves exactly
//! one job: before running it, the worker spawns its successor and hands it
//! to the idle queue, so the thread that performed a restart never stays
//! reachable from the executor afterwards. Anything the job leaves behind in
//! the worker's thread-locals dies with the worker.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use relaunch_kernel::RestartError;
use tracing::{debug, error, trace};

use crate::unwind::{is_silent_exit, panic_message};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Invoked when a worker cannot continue: the job panicked or no successor
/// could be spawned. The default terminates the process with status 1.
pub type FatalHandler = Arc<dyn Fn(&str) + Send + Sync>;

pub(crate) fn exit_process() -> FatalHandler {
    Arc::new(|reason: &str| {
        error!(reason, "Leak-safe worker failed, terminating the process");
        std::process::exit(1);
    })
}

struct Shared {
    name: String,
    next_id: AtomicU64,
    idle_tx: Sender<LeakSafeWorker>,
    idle_rx: Receiver<LeakSafeWorker>,
    fatal: FatalHandler,
}

/// Handle to one parked worker
struct LeakSafeWorker {
    id: u64,
    job_tx: Sender<Job>,
}

/// Hands each job to a fresh single-use worker thread.
///
/// Exactly one idle worker exists between jobs, so concurrent callers queue
/// on the idle channel in arrival order.
#[derive(Clone)]
pub struct LeakSafeExecutor {
    shared: Arc<Shared>,
}

impl fmt::Debug for LeakSafeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakSafeExecutor")
            .field("name", &self.shared.name)
            .field("idle_workers", &self.idle_workers())
            .finish()
    }
}

impl LeakSafeExecutor {
    /// Create the executor and park its first worker.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        Self::with_fatal_handler(name, exit_process())
    }

    pub fn with_fatal_handler(name: impl Into<String>, fatal: FatalHandler) -> io::Result<Self> {
        let (idle_tx, idle_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            name: name.into(),
            next_id: AtomicU64::new(0),
            idle_tx,
            idle_rx,
            fatal,
        });

        let first = spawn_worker(&shared)?;
        // The executor holds the receiver, so the send cannot fail.
        let _ = shared.idle_tx.send(first);
        Ok(Self { shared })
    }

    /// Run `work` on the next idle worker without waiting for it.
    pub fn call<F>(&self, work: F) -> Result<(), RestartError>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker = self.shared.idle_rx.recv().map_err(|_| RestartError::Interrupted)?;
        trace!(worker = worker.id, "Dispatching job");
        worker.job_tx.send(Box::new(work)).map_err(|_| RestartError::Interrupted)
    }

    /// Run `work` on the next idle worker and block for its result.
    ///
    /// Fails with [`RestartError::Interrupted`] when the worker ends without
    /// producing a value.
    pub fn call_and_wait<F, T>(&self, work: F) -> Result<T, RestartError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);
        self.call(move || {
            let _ = result_tx.send(work());
        })?;
        result_rx.recv().map_err(|_| RestartError::Interrupted)
    }

    /// Parked workers, 1 whenever no job is being dispatched
    pub fn idle_workers(&self) -> usize {
        self.shared.idle_rx.len()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

fn spawn_worker(shared: &Arc<Shared>) -> io::Result<LeakSafeWorker> {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(1);
    let weak = Arc::downgrade(shared);
    let fatal = Arc::clone(&shared.fatal);

    thread::Builder::new()
        .name(format!("{}-{}", shared.name, id))
        .spawn(move || run_worker(id, job_rx, weak, fatal))?;

    trace!(worker = id, "Spawned leak-safe worker");
    Ok(LeakSafeWorker { id, job_tx })
}

fn run_worker(id: u64, job_rx: Receiver<Job>, shared: Weak<Shared>, fatal: FatalHandler) {
    let Ok(job) = job_rx.recv() else {
        debug!(worker = id, "Executor dropped, retiring idle worker");
        return;
    };

    // Successor first, so the executor never references this thread again.
    if let Some(shared) = shared.upgrade() {
        match spawn_worker(&shared) {
            Ok(successor) => {
                let _ = shared.idle_tx.send(successor);
            }
            Err(err) => {
                error!(worker = id, error = %err, "Failed to spawn successor worker");
                fatal(&format!("failed to spawn successor worker: {err}"));
            }
        }
    }

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        if is_silent_exit(payload.as_ref()) {
            trace!(worker = id, "Job exited silently");
            return;
        }
        let message = panic_message(payload.as_ref());
        error!(worker = id, panic = %message, "Leak-safe job panicked");
        fatal(&message);
    }
}

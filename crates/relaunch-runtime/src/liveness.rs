//! Live-thread accounting
//!
//! Tracks application threads started through the launcher and the thread
//! factory so a host can wait until the application has no threads left.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Counter {
    live: Mutex<usize>,
    changed: Condvar,
}

/// Shared count of running application threads
#[derive(Debug, Clone, Default)]
pub struct LiveThreads {
    counter: Arc<Counter>,
}

/// Decrements the live count when dropped.
///
/// Created before a thread is spawned and moved into it, so the count never
/// reads zero while a thread is about to start.
#[derive(Debug)]
#[must_use = "the thread is counted only while the guard is alive"]
pub struct LiveGuard {
    counter: Arc<Counter>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let mut live = self.counter.live.lock();
        *live -= 1;
        if *live == 0 {
            self.counter.changed.notify_all();
        }
    }
}

impl LiveThreads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> LiveGuard {
        *self.counter.live.lock() += 1;
        LiveGuard {
            counter: Arc::clone(&self.counter),
        }
    }

    pub fn count(&self) -> usize {
        *self.counter.live.lock()
    }

    /// Block until no registered thread is alive.
    pub fn wait_until_idle(&self) {
        let mut live = self.counter.live.lock();
        while *live > 0 {
            self.counter.changed.wait(&mut live);
        }
    }

    /// Like [`wait_until_idle`](Self::wait_until_idle), giving up after
    /// `timeout`. Returns whether the count reached zero.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = self.counter.live.lock();
        while *live > 0 {
            if self.counter.changed.wait_until(&mut live, deadline).timed_out() {
                return *live == 0;
            }
        }
        true
    }
}

//! Thread factory for application threads
//!
//! Threads are created from a leak-safe worker rather than from the caller,
//! so nothing the caller's thread holds leaks into them. Each new thread is
//! bound to the controller's current image.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use relaunch_kernel::{OverlayImage, RestartError, context};
use tracing::trace;

use crate::executor::LeakSafeExecutor;
use crate::liveness::LiveThreads;

pub(crate) type ImageSlot = Arc<RwLock<Option<Arc<OverlayImage>>>>;

/// Spawns threads that resolve code through the running generation
#[derive(Clone)]
pub struct LeakSafeThreadFactory {
    executor: LeakSafeExecutor,
    live: LiveThreads,
    image: ImageSlot,
}

impl LeakSafeThreadFactory {
    pub(crate) fn new(executor: LeakSafeExecutor, live: LiveThreads, image: ImageSlot) -> Self {
        Self { executor, live, image }
    }

    /// Spawn an unnamed thread running `f`.
    pub fn spawn<F, T>(&self, f: F) -> Result<JoinHandle<T>, RestartError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_with(thread::Builder::new(), f)
    }

    pub fn spawn_named<F, T>(&self, name: impl Into<String>, f: F) -> Result<JoinHandle<T>, RestartError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_with(thread::Builder::new().name(name.into()), f)
    }

    fn spawn_with<F, T>(&self, builder: thread::Builder, f: F) -> Result<JoinHandle<T>, RestartError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let image = self.image.read().clone();
        let live = self.live.clone();

        let handle = self.executor.call_and_wait(move || {
            trace!(generation = ?image.as_ref().map(|i| i.generation()), "Creating application thread");
            let guard = live.register();
            builder.spawn(move || {
                let _live = guard;
                let _context = image.map(context::enter);
                f()
            })
        })??;
        Ok(handle)
    }
}

//! The restart controller
//!
//! A restart cycle runs on a leak-safe worker:
//!
//! 1. **stop**: under the stop lock, fire and clear the listeners and drop the
//!    current image, then issue the reclaim hint.
//! 2. **rebuild**: resolve the bootstrap locations against a snapshot of the
//!    overlay store and publish the result as the next generation.
//! 3. **launch**: run the entry point on a fresh launcher thread, retrying
//!    or aborting on failure as the [`FailurePolicy`] decides.
//!
//! Cycles are serialized in arrival order by a fair lock.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use error_stack::{Report, ResultExt};
use parking_lot::{FairMutex, Mutex, RwLock};
use relaunch_kernel::{
    AbortPolicy, CodeLocation, DefaultInitializer, FailurePolicy, InitializationError, Initializer, LaunchError,
    Outcome, OverlayImage, OverlayStore, RelaunchResult, RestartConfig, RestartError, RestartListener,
};
use tracing::{debug, error, trace, warn};

use crate::executor::{FatalHandler, LeakSafeExecutor, exit_process};
use crate::launcher::{self, DefaultLinker, Launcher, Linker};
use crate::liveness::LiveThreads;
use crate::thread_factory::{ImageSlot, LeakSafeThreadFactory};
use crate::unwind::exit_current_thread;

/// Lifecycle of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Created, no relaunch has happened yet
    Initialized,
    /// The last launch completed normally
    Running,
    /// A restart cycle is in progress
    Restarting,
    /// The last restart was aborted; nothing is running from it
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Initialized => write!(f, "Initialized"),
            ControllerState::Running => write!(f, "Running"),
            ControllerState::Restarting => write!(f, "Restarting"),
            ControllerState::Failed => write!(f, "Failed"),
        }
    }
}

/// Receives a launch failure once the policy gives up on it.
pub type UncaughtHandler = Arc<dyn Fn(&LaunchError) + Send + Sync>;

/// Runs between stop and relaunch, once per cycle.
pub type ReclaimHook = Arc<dyn Fn() + Send + Sync>;

fn log_uncaught() -> UncaughtHandler {
    Arc::new(|error: &LaunchError| {
        error!(error = %error.chain(), "Relaunch aborted");
    })
}

/// Configures and builds a [`RestartController`].
///
/// The built controller becomes the process singleton through
/// [`initialize_with`](crate::initialize_with) or [`install`](crate::install).
pub struct RestartControllerBuilder {
    args: Vec<String>,
    config: RestartConfig,
    initializer: Option<Box<dyn Initializer>>,
    linker: Arc<dyn Linker>,
    uncaught: UncaughtHandler,
    reclaim: Option<ReclaimHook>,
    fatal: FatalHandler,
}

impl RestartControllerBuilder {
    /// Start from the program arguments every generation is launched with.
    ///
    /// The configuration starts as [`RestartConfig::from_env`], so `RELAUNCH_*`
    /// variables apply without further setup; it falls back to the defaults
    /// when they do not parse. [`with_config`](Self::with_config) replaces it.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            config: RestartConfig::from_env().unwrap_or_else(|err| {
                warn!(error = %err, "Ignoring invalid RELAUNCH_ environment overrides");
                RestartConfig::default()
            }),
            initializer: None,
            linker: Arc::new(DefaultLinker),
            uncaught: log_uncaught(),
            reclaim: None,
            fatal: exit_process(),
        }
    }

    pub fn with_config(mut self, config: RestartConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to a [`DefaultInitializer`] over the configuration.
    pub fn with_initializer(mut self, initializer: impl Initializer + 'static) -> Self {
        self.initializer = Some(Box::new(initializer));
        self
    }

    pub fn with_linker(mut self, linker: impl Linker + 'static) -> Self {
        self.linker = Arc::new(linker);
        self
    }

    pub fn with_uncaught_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LaunchError) + Send + Sync + 'static,
    {
        self.uncaught = Arc::new(handler);
        self
    }

    pub fn with_reclaim_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.reclaim = Some(Arc::new(hook));
        self
    }

    /// Replace the process exit performed when a leak-safe worker fails.
    pub fn with_fatal_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.fatal = Arc::new(handler);
        self
    }

    /// Build a controller that is not registered as the process singleton.
    #[cfg(any(test, feature = "testing"))]
    pub fn build_detached(self) -> RelaunchResult<RestartController> {
        self.build()
    }

    pub(crate) fn build(self) -> RelaunchResult<RestartController> {
        let thread = std::thread::current();
        let initializer = self
            .initializer
            .unwrap_or_else(|| Box::new(DefaultInitializer::new(self.config.clone())));

        let locations = initializer
            .initial_locations(&thread)
            .map_err(Report::new)
            .attach("resolving the initial code locations")?;
        let entry_point = initializer
            .entry_point(&thread)
            .map_err(Report::new)
            .attach("resolving the entry point")?;

        let initial_overlay = initializer.initial_overlay();
        let pending_initial = !initial_overlay.is_empty();
        let overlay = Arc::new(OverlayStore::new());
        overlay.apply(initial_overlay.into_values());

        let executor = LeakSafeExecutor::with_fatal_handler(self.config.worker_name.clone(), self.fatal)
            .map_err(|err| Report::new(InitializationError::Worker(err)))?;

        let live = LiveThreads::new();
        let launcher = Launcher::new(self.config.launcher_thread_name.clone(), self.linker, live.clone());
        let bootstrap = OverlayImage::resolve(&locations, Default::default());

        debug!(
            entry = %entry_point,
            locations = %render_locations(bootstrap.base()),
            pending = overlay.len(),
            "Restart controller initialized"
        );

        Ok(RestartController {
            inner: Arc::new(Inner {
                args: self.args.into(),
                entry_point,
                locations: bootstrap.base().to_vec(),
                overlay,
                image: Arc::new(RwLock::new(Some(Arc::new(bootstrap)))),
                stop_lock: Mutex::new(()),
                cycle_lock: FairMutex::new(()),
                listeners: Mutex::new(Vec::new()),
                state: Mutex::new(ControllerState::Initialized),
                generation: AtomicU64::new(0),
                executor,
                launcher,
                live,
                uncaught: self.uncaught,
                reclaim: self.reclaim,
                reclaim_hint: self.config.reclaim_hint,
                pending_initial,
            }),
        })
    }
}

fn render_locations(locations: &[CodeLocation]) -> String {
    locations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

struct Inner {
    args: Arc<[String]>,
    entry_point: String,
    locations: Vec<CodeLocation>,
    overlay: Arc<OverlayStore>,
    image: ImageSlot,
    /// Guards listener firing and every swap of `image`
    stop_lock: Mutex<()>,
    /// Held across a whole stop-rebuild-launch cycle
    cycle_lock: FairMutex<()>,
    listeners: Mutex<Vec<Arc<dyn RestartListener>>>,
    state: Mutex<ControllerState>,
    generation: AtomicU64,
    executor: LeakSafeExecutor,
    launcher: Launcher,
    live: LiveThreads,
    uncaught: UncaughtHandler,
    reclaim: Option<ReclaimHook>,
    reclaim_hint: bool,
    pending_initial: bool,
}

impl Inner {
    fn cycle(&self, policy: &dyn FailurePolicy) -> Result<(), RestartError> {
        let _cycle = self.cycle_lock.lock();
        self.stop();
        self.start(policy)
    }

    fn stop(&self) {
        debug!("Stopping application");
        let previous = {
            let _stop = self.stop_lock.lock();
            *self.state.lock() = ControllerState::Restarting;

            let listeners = std::mem::take(&mut *self.listeners.lock());
            for listener in &listeners {
                listener.before_stop();
            }
            trace!(fired = listeners.len(), "Restart listeners notified");

            self.image.write().take()
        };

        if let Some(image) = previous {
            // Anything above one is a reference still held by the old generation.
            let retained = Arc::strong_count(&image) - 1;
            debug!(generation = image.generation(), retained, "Released code image");
        }

        if self.reclaim_hint {
            if let Some(reclaim) = &self.reclaim {
                trace!("Issuing reclaim hint");
                reclaim();
            }
        }
    }

    fn rebuild(&self) -> Arc<OverlayImage> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let image = Arc::new(OverlayImage::resolve(&self.locations, self.overlay.snapshot()).with_generation(generation));
        debug!(generation, overlay = ?image.overlay_names(), "Built code image");

        let _stop = self.stop_lock.lock();
        *self.image.write() = Some(Arc::clone(&image));
        image
    }

    fn start(&self, policy: &dyn FailurePolicy) -> Result<(), RestartError> {
        let image = self.rebuild();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self
                .launcher
                .launch(Arc::clone(&image), &self.entry_point, Arc::clone(&self.args))
            {
                Ok(()) => {
                    *self.state.lock() = ControllerState::Running;
                    debug!(generation = image.generation(), attempt, "Application relaunched");
                    return Ok(());
                }
                Err(error) => error,
            };

            error!(generation = image.generation(), attempt, error = %error.chain(), "Application failed to start");
            match policy.handle(&error, attempt) {
                Outcome::Retry => debug!(attempt, "Retrying launch"),
                Outcome::Abort => {
                    *self.state.lock() = ControllerState::Failed;
                    (self.uncaught)(&error);
                    return Err(RestartError::Aborted(error));
                }
            }
        }
    }

    fn initial_start(&self) -> Result<(), RestartError> {
        let _cycle = self.cycle_lock.lock();
        self.start(&AbortPolicy)
    }
}

/// Stops, rebuilds and relaunches the application in place.
///
/// Cheap to clone; all clones drive the same controller.
#[derive(Clone)]
pub struct RestartController {
    inner: Arc<Inner>,
}

impl fmt::Debug for RestartController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestartController")
            .field("entry_point", &self.inner.entry_point)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("overlay", &self.inner.overlay.len())
            .finish()
    }
}

impl RestartController {
    /// Register a one-shot listener for the next stop.
    ///
    /// Registering the same `Arc` twice has no effect.
    pub fn add_listener(&self, listener: Arc<dyn RestartListener>) {
        let mut listeners = self.inner.listeners.lock();
        if listeners.iter().any(|known| Arc::ptr_eq(known, &listener)) {
            return;
        }
        listeners.push(listener);
    }

    /// Restart with the [`AbortPolicy`].
    pub fn restart(&self) -> Result<(), RestartError> {
        self.restart_with(AbortPolicy)
    }

    /// Restart and block until the new generation's entry point returned or
    /// `policy` aborted.
    ///
    /// Fails with [`RestartError::Reentrant`] when called from an entry
    /// point that has not returned yet.
    pub fn restart_with<P>(&self, policy: P) -> Result<(), RestartError>
    where
        P: FailurePolicy + 'static,
    {
        if launcher::is_starting() {
            warn!("Ignoring restart requested while the application is starting");
            return Err(RestartError::Reentrant);
        }
        debug!("Restarting application");
        let inner = Arc::clone(&self.inner);
        self.inner.executor.call_and_wait(move || inner.cycle(&policy))?
    }

    /// Queue a restart without waiting for it.
    pub fn restart_detached<P>(&self, policy: P) -> Result<(), RestartError>
    where
        P: FailurePolicy + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.call(move || {
            if let Err(err) = inner.cycle(&policy) {
                warn!(error = %err, "Detached restart failed");
            }
        })
    }

    /// Launch the pending overlay once, then end the calling thread.
    ///
    /// Returns only when the launch failed; the calling thread keeps running
    /// and receives the error.
    pub(crate) fn immediate_restart(&self) -> Result<Infallible, RestartError> {
        debug!("Immediately restarting application");
        let inner = Arc::clone(&self.inner);
        if let Err(err) = self.inner.executor.call_and_wait(move || inner.initial_start())? {
            warn!(error = %err, "Immediate restart failed");
            return Err(err);
        }
        exit_current_thread()
    }

    /// Whether the initializer reported changes that predate the controller
    pub(crate) fn has_pending_overlay(&self) -> bool {
        self.inner.pending_initial
    }

    /// Factory for threads bound to the current generation
    pub fn thread_factory(&self) -> LeakSafeThreadFactory {
        LeakSafeThreadFactory::new(
            self.inner.executor.clone(),
            self.inner.live.clone(),
            Arc::clone(&self.inner.image),
        )
    }

    /// Store that change detectors push overlay records into
    pub fn overlay(&self) -> Arc<OverlayStore> {
        Arc::clone(&self.inner.overlay)
    }

    /// Image of the running generation, `None` while a restart is between
    /// stop and rebuild
    pub fn current_image(&self) -> Option<Arc<OverlayImage>> {
        self.inner.image.read().clone()
    }

    pub fn state(&self) -> ControllerState {
        *self.inner.state.lock()
    }

    /// Number of images built by restarts so far
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn entry_point(&self) -> &str {
        &self.inner.entry_point
    }

    pub fn args(&self) -> &[String] {
        &self.inner.args
    }

    /// Block until every launcher and factory thread has finished.
    pub fn wait_for_exit(&self) {
        self.inner.live.wait_until_idle();
    }
}

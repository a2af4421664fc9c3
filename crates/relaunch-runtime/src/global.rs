//! The process-wide controller

use std::sync::OnceLock;

use error_stack::Report;
use parking_lot::Mutex;
use relaunch_kernel::{InitializationError, Initializer, RelaunchResult, RestartError};
use tracing::debug;

use crate::controller::{RestartController, RestartControllerBuilder};

static INSTANCE_LOCK: Mutex<()> = parking_lot::const_mutex(());
static INSTANCE: OnceLock<RestartController> = OnceLock::new();

/// Create the process controller on first call; later calls return it
/// unchanged.
///
/// With `restart_immediately` and changes already pending from the
/// initializer, the application is relaunched right away and the calling
/// thread then ends through a silent exit, see
/// [`catch_silent_exit`](crate::unwind::catch_silent_exit). If that launch
/// fails, the calling thread keeps running and gets
/// [`InitializationError::ImmediateRestart`]; the controller stays registered.
pub fn initialize<I, S>(
    args: I,
    initializer: impl Initializer + 'static,
    restart_immediately: bool,
) -> RelaunchResult<RestartController>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    initialize_with(
        RestartControllerBuilder::new(args).with_initializer(initializer),
        restart_immediately,
    )
}

/// [`initialize`] with a fully configured builder.
pub fn initialize_with(
    builder: RestartControllerBuilder,
    restart_immediately: bool,
) -> RelaunchResult<RestartController> {
    let controller = {
        let _guard = INSTANCE_LOCK.lock();
        if let Some(existing) = INSTANCE.get() {
            debug!("Restart controller already initialized");
            return Ok(existing.clone());
        }
        let controller = builder.build()?;
        let _ = INSTANCE.set(controller.clone());
        controller
    };

    if restart_immediately && controller.has_pending_overlay() {
        let Err(err) = controller.immediate_restart();
        return Err(Report::new(InitializationError::ImmediateRestart(err))
            .attach("launching the changes pending at startup"));
    }
    Ok(controller)
}

/// Register `builder`'s controller, failing if one already exists.
pub fn install(builder: RestartControllerBuilder) -> RelaunchResult<RestartController> {
    let _guard = INSTANCE_LOCK.lock();
    if INSTANCE.get().is_some() {
        return Err(Report::new(InitializationError::AlreadyInitialized));
    }
    let controller = builder.build()?;
    let _ = INSTANCE.set(controller.clone());
    Ok(controller)
}

/// The process controller
pub fn instance() -> Result<RestartController, RestartError> {
    INSTANCE.get().cloned().ok_or(RestartError::NotInitialized)
}

/// Whether a process controller exists
pub fn is_initialized() -> bool {
    INSTANCE.get().is_some()
}

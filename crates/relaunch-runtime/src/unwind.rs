//! Silent thread exit and panic payload helpers

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::trace;

/// Unwind payload that ends the current thread without reporting anything.
///
/// Raised after an immediate restart so the original, un-restarted call
/// stack never resumes. Unlike a panic it does not run the panic hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilentExit;

/// Unwind the calling thread with [`SilentExit`].
pub fn exit_current_thread() -> ! {
    trace!(thread = ?std::thread::current().name(), "Silently exiting current thread");
    panic::resume_unwind(Box::new(SilentExit))
}

/// Whether a caught unwind payload is a [`SilentExit`]
pub fn is_silent_exit(payload: &(dyn Any + Send)) -> bool {
    payload.is::<SilentExit>()
}

/// Run `f`, absorbing a [`SilentExit`].
///
/// Returns `None` when `f` exited silently; any other panic keeps unwinding.
/// Hosts wrap their `main` body with this and then wait on the controller:
///
/// ```rust,ignore
/// fn main() {
///     let args: Vec<String> = std::env::args().skip(1).collect();
///     if unwind::catch_silent_exit(|| app::main(args)).is_none() {
///         relaunch_runtime::instance().unwrap().wait_for_exit();
///     }
/// }
/// ```
pub fn catch_silent_exit<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) if is_silent_exit(payload.as_ref()) => None,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Best-effort message of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if is_silent_exit(payload) {
        "silent exit".to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

use relaunch_kernel::RestartError;
use relaunch_runtime::RestartController;

/// What the watcher calls once changes were pushed into the overlay store
pub trait RestartTrigger: Send + Sync + 'static {
    fn restart(&self) -> Result<(), RestartError>;
}

impl RestartTrigger for RestartController {
    fn restart(&self) -> Result<(), RestartError> {
        RestartController::restart(self)
    }
}

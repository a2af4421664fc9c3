//! Failure policies for relaunch attempts

use std::time::Duration;

use tracing::debug;

use crate::error::LaunchError;

/// Decision taken after a failed launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Launch again with the same image
    Retry,
    /// Stop trying and report the failure
    Abort,
}

/// Decides whether a failed relaunch is attempted again.
///
/// `attempt` starts at 1 for the first launch of a restart cycle.
pub trait FailurePolicy: Send + Sync {
    fn handle(&self, error: &LaunchError, attempt: u32) -> Outcome;
}

impl<F> FailurePolicy for F
where
    F: Fn(&LaunchError, u32) -> Outcome + Send + Sync,
{
    fn handle(&self, error: &LaunchError, attempt: u32) -> Outcome {
        self(error, attempt)
    }
}

/// Never retry. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortPolicy;

impl FailurePolicy for AbortPolicy {
    fn handle(&self, _error: &LaunchError, _attempt: u32) -> Outcome {
        Outcome::Abort
    }
}

/// Always retry
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl FailurePolicy for RetryPolicy {
    fn handle(&self, _error: &LaunchError, _attempt: u32) -> Outcome {
        Outcome::Retry
    }
}

/// Retry up to `max_attempts` launches, sleeping `cooldown` in between.
#[derive(Debug, Clone)]
pub struct LimitedRetry {
    pub max_attempts: u32,
    pub cooldown: Duration,
}

impl LimitedRetry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            cooldown: Duration::ZERO,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

impl Default for LimitedRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown: Duration::from_secs(5),
        }
    }
}

impl FailurePolicy for LimitedRetry {
    fn handle(&self, _error: &LaunchError, attempt: u32) -> Outcome {
        if attempt >= self.max_attempts {
            return Outcome::Abort;
        }
        if !self.cooldown.is_zero() {
            debug!(attempt, cooldown = ?self.cooldown, "Waiting before the next launch attempt");
            std::thread::sleep(self.cooldown);
        }
        Outcome::Retry
    }
}

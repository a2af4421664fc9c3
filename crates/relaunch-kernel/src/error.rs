//! Crate-level error types for `relaunch-kernel`.
//!
//! Three families of failure surface from a restart cycle:
//!
//! - [`InitializationError`]: the controller could not be built (no entry
//!   point, no code locations, bad configuration). Fatal.
//! - [`LaunchError`]: a relaunched entry point failed. Recoverable through a
//!   [`FailurePolicy`](crate::policy::FailurePolicy).
//! - [`RestartError`]: what a caller of `restart()` observes.
//!
//! Initialization goes through [`error_stack::Report`] (via
//! [`RelaunchResult`]) so the configuration layer can attach context as the
//! error propagates.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// The controller could not be constructed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InitializationError {
    /// No entry point could be determined for the application.
    #[error("Unable to find the entry point to relaunch")]
    EntryPointNotFound,

    /// No code locations could be determined for the application.
    #[error("Unable to determine the initial code locations: {0}")]
    LocationsUnavailable(String),

    /// A controller was already installed in this process.
    #[error("Restart controller has already been initialized")]
    AlreadyInitialized,

    /// The first leak-safe worker could not be spawned.
    #[error("Failed to spawn the leak-safe worker: {0}")]
    Worker(#[source] std::io::Error),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The pending changes were launched right away and did not start.
    #[error("Immediate restart failed: {0}")]
    ImmediateRestart(#[source] RestartError),
}

/// A relaunched entry point did not complete normally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    /// The code image does not define the entry point.
    #[error("Entry point `{0}` is not defined by the code image")]
    Unresolved(String),

    /// The entry point resolved to content that cannot be run.
    #[error("Content for `{name}` is not executable: {reason}")]
    NotExecutable { name: String, reason: String },

    /// A shared library could not be staged or loaded.
    #[error("Failed to load library {}: {reason}", path.display())]
    Library { path: PathBuf, reason: String },

    /// The entry point returned an error.
    #[error("Entry point `{entry}` failed")]
    Failed {
        entry: String,
        #[source]
        source: anyhow::Error,
    },

    /// The entry point panicked.
    #[error("Entry point `{entry}` panicked: {message}")]
    Panicked { entry: String, message: String },

    /// The dedicated launcher thread could not be spawned.
    #[error("Failed to spawn the launcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl LaunchError {
    /// Render this error followed by every `source()` in its chain.
    pub fn chain(&self) -> String {
        error_chain(self)
    }
}

/// Error observed by callers of the restart API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RestartError {
    /// `instance()` was called before `initialize()`.
    #[error("Restart controller has not been initialized")]
    NotInitialized,

    /// The failure policy aborted the relaunch.
    #[error("Relaunch aborted: {0}")]
    Aborted(#[from] LaunchError),

    /// The leak-safe worker went away before reporting a result.
    #[error("Interrupted while waiting for a leak-safe worker")]
    Interrupted,

    /// `restart()` was called from the entry point while it was starting.
    #[error("Cannot restart from the entry point while it is starting")]
    Reentrant,

    /// A thread could not be spawned.
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Convenience result alias using [`error_stack::Report`].
pub type RelaunchResult<T> = Result<T, error_stack::Report<InitializationError>>;

/// Joins an error and all of its sources with `: `.
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

//! Relaunch Kernel
//!
//! Types shared by the restart controller and its collaborators:
//!
//! - [`CodeLocation`] and [`ModuleTable`]: where modules come from
//! - [`OverlayRecord`], [`OverlayStore`] and [`OverlayImage`]: edits layered
//!   on top of the bootstrap locations, and the resolved view one generation runs
//! - [`context`]: the thread-local image a generation's threads resolve through
//! - [`Initializer`], [`RestartListener`] and [`FailurePolicy`]: the
//!   collaborator contracts
//! - [`RestartConfig`]: layered configuration

pub mod config;
pub mod context;
pub mod error;
pub mod initializer;
pub mod listener;
pub mod location;
pub mod module;
pub mod overlay;
pub mod policy;

pub use config::{ConfigError, RestartConfig};
pub use error::{InitializationError, LaunchError, RelaunchResult, RestartError, error_chain};
pub use initializer::{DefaultInitializer, Initializer, StaticInitializer};
pub use listener::RestartListener;
pub use location::{CodeLocation, ModuleTable};
pub use module::{Content, Module};
pub use overlay::{Overlay, OverlayImage, OverlayRecord, OverlayStore};
pub use policy::{AbortPolicy, FailurePolicy, LimitedRetry, Outcome, RetryPolicy};

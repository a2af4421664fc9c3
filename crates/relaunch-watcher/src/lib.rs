//! Relaunch Watcher
//!
//! Detects changes in code directories and feeds them to a restart
//! controller as overlay records.
//!
//! ```rust,ignore
//! let controller = relaunch_runtime::instance()?;
//! let mut watcher = ClasspathWatcher::for_controller(WatchConfig::default(), &controller);
//! watcher.watch("target/classes")?;
//! watcher.start().await?;
//! ```

pub mod config;
pub mod error;
pub mod snapshot;
pub mod trigger;
pub mod watcher;

pub use config::WatchConfig;
pub use error::{WatchError, WatchResult};
pub use snapshot::{FileEntry, Snapshot, diff_layers};
pub use trigger::RestartTrigger;
pub use watcher::ClasspathWatcher;

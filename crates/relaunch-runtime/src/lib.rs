//! Relaunch Runtime
//!
//! The in-process restart controller and the machinery it runs on.
//!
//! # Example
//!
//! ```rust,ignore
//! use relaunch_kernel::{CodeLocation, Content, ModuleTable, StaticInitializer};
//! use relaunch_runtime::unwind::catch_silent_exit;
//!
//! fn main() -> anyhow::Result<()> {
//!     let app = ModuleTable::new("app").with("main", Content::from_fn(app::main));
//!     let initializer = StaticInitializer::new("main").with_location(CodeLocation::table(app));
//!
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     let controller = match catch_silent_exit(|| relaunch_runtime::initialize(args, initializer, true)) {
//!         Some(result) => result.map_err(|report| anyhow::anyhow!("{report:?}"))?,
//!         None => {
//!             // Relaunched immediately; the original main body is gone.
//!             relaunch_runtime::instance()?.wait_for_exit();
//!             return Ok(());
//!         }
//!     };
//!
//!     controller.restart()?;
//!     controller.wait_for_exit();
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod executor;
mod global;
pub mod launcher;
pub mod library;
pub mod liveness;
pub mod thread_factory;
pub mod unwind;

pub use controller::{ControllerState, ReclaimHook, RestartController, RestartControllerBuilder, UncaughtHandler};
pub use executor::{FatalHandler, LeakSafeExecutor};
pub use global::{initialize, initialize_with, install, instance, is_initialized};
pub use launcher::{DefaultLinker, Launcher, Linker, RESTARTED_THREAD_NAME};
pub use library::LibraryModule;
pub use liveness::LiveThreads;
pub use thread_factory::LeakSafeThreadFactory;
pub use unwind::{SilentExit, catch_silent_exit, exit_current_thread};

pub use relaunch_kernel as kernel;

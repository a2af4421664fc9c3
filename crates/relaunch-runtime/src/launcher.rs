//! Linking and launching an entry point on a dedicated thread

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use relaunch_kernel::{Content, LaunchError, Module, OverlayImage, context};
use tracing::{debug, info, instrument};

use crate::library::{LibraryModule, is_library_path};
use crate::liveness::LiveThreads;
use crate::unwind::{is_silent_exit, panic_message};

/// Default name of each generation's main thread
pub const RESTARTED_THREAD_NAME: &str = "restartedMain";

/// Turns the content an image resolves for the entry point into something
/// runnable.
pub trait Linker: Send + Sync {
    fn link(&self, image: &OverlayImage, entry: &str) -> Result<Arc<dyn Module>, LaunchError>;
}

/// Runs in-process modules directly and loads shared libraries, whether
/// they come from a file or from raw overlay bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLinker;

impl Linker for DefaultLinker {
    fn link(&self, image: &OverlayImage, entry: &str) -> Result<Arc<dyn Module>, LaunchError> {
        match image.lookup(entry) {
            None => Err(LaunchError::Unresolved(entry.to_string())),
            Some(Content::Module(module)) => Ok(module),
            Some(Content::File(path)) if is_library_path(&path) => {
                Ok(Arc::new(LibraryModule::load_file(&path)?))
            }
            Some(Content::File(path)) => Err(LaunchError::NotExecutable {
                name: entry.to_string(),
                reason: format!("{} is not a shared library", path.display()),
            }),
            Some(Content::Bytes(bytes)) => Ok(Arc::new(LibraryModule::load_bytes(Path::new(entry), &bytes)?)),
        }
    }
}

thread_local! {
    static STARTING: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is a launcher thread whose entry point has
/// not returned yet
pub fn is_starting() -> bool {
    STARTING.with(Cell::get)
}

struct StartupGuard;

impl StartupGuard {
    fn enter() -> Self {
        STARTING.with(|starting| starting.set(true));
        Self
    }
}

impl Drop for StartupGuard {
    fn drop(&mut self) {
        STARTING.with(|starting| starting.set(false));
    }
}

/// Runs an entry point on a fresh named thread bound to one image.
pub struct Launcher {
    thread_name: String,
    linker: Arc<dyn Linker>,
    live: LiveThreads,
}

impl Launcher {
    pub fn new(thread_name: impl Into<String>, linker: Arc<dyn Linker>, live: LiveThreads) -> Self {
        Self {
            thread_name: thread_name.into(),
            linker,
            live,
        }
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Link `entry` against `image`, run it with `args` on a new thread and
    /// wait for it.
    ///
    /// The thread has the image bound as its context for its whole life.
    /// An entry point that ends by silently exiting counts as a success.
    #[instrument(skip(self, image, args), fields(generation = image.generation()))]
    pub fn launch(&self, image: Arc<OverlayImage>, entry: &str, args: Arc<[String]>) -> Result<(), LaunchError> {
        let linker = Arc::clone(&self.linker);
        let entry_name = entry.to_string();
        let guard = self.live.register();

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let _live = guard;
                let _context = context::enter(Arc::clone(&image));
                let _starting = StartupGuard::enter();
                run_entry(linker.as_ref(), &image, &entry_name, &args)
            })
            .map_err(LaunchError::Spawn)?;

        match handle.join() {
            Ok(result) => result,
            Err(payload) => Err(LaunchError::Panicked {
                entry: entry.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn run_entry(linker: &dyn Linker, image: &OverlayImage, entry: &str, args: &[String]) -> Result<(), LaunchError> {
    let module = linker.link(image, entry)?;
    info!(entry, generation = image.generation(), overlay = ?image.overlay_names(), "Starting entry point");

    match panic::catch_unwind(AssertUnwindSafe(|| module.run(args))) {
        Ok(Ok(())) => {
            debug!(entry, "Entry point returned");
            Ok(())
        }
        Ok(Err(source)) => Err(LaunchError::Failed {
            entry: entry.to_string(),
            source,
        }),
        Err(payload) if is_silent_exit(payload.as_ref()) => {
            debug!(entry, "Entry point exited silently");
            Ok(())
        }
        Err(payload) => Err(LaunchError::Panicked {
            entry: entry.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

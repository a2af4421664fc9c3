//! Shared-library modules
//!
//! A module stored as a `.so`, `.dylib` or `.dll` file is copied into a
//! private staging directory before it is loaded. Every generation therefore
//! maps its own copy, and the dynamic loader's per-path cache never hands a
//! new generation the code of an old one.

use std::ffi::{CString, c_char};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, bail};
use libloading::{Library, Symbol};
use relaunch_kernel::{LaunchError, Module};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, info};

/// Symbol every library module exports, see [`declare_entry!`](crate::declare_entry)
pub const ENTRY_SYMBOL: &[u8] = b"relaunch_main";

/// Signature of [`ENTRY_SYMBOL`]: argument count and NUL-terminated
/// arguments in, exit status out
pub type EntryFn = unsafe extern "C" fn(argc: usize, argv: *const *const c_char) -> i32;

/// Whether `path` names a shared library for the current platform.
pub fn is_library_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    match ext.to_ascii_lowercase().as_str() {
        "so" => cfg!(all(unix, not(target_os = "macos"))),
        "dylib" => cfg!(target_os = "macos"),
        "dll" => cfg!(windows),
        _ => false,
    }
}

fn library_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// A staged, loaded shared library exposing [`ENTRY_SYMBOL`]
pub struct LibraryModule {
    /// Where the module came from
    origin: PathBuf,
    /// Unloaded before the staging directory is removed
    library: Library,
    staging: TempDir,
    digest: String,
    loaded_at: Instant,
}

impl LibraryModule {
    /// Stage and load the library at `path`.
    pub fn load_file(path: &Path) -> Result<Self, LaunchError> {
        let bytes = std::fs::read(path).map_err(|err| library_error(path, err))?;
        Self::load_bytes(path, &bytes)
    }

    /// Stage `bytes` as a library and load it. `origin` is only reported.
    pub fn load_bytes(origin: &Path, bytes: &[u8]) -> Result<Self, LaunchError> {
        let staging = tempfile::Builder::new()
            .prefix("relaunch-")
            .tempdir()
            .map_err(|err| library_error(origin, err))?;

        let file_name = origin
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("module");
        let staged = staging.path().join(format!("{file_name}.{}", library_extension()));
        std::fs::write(&staged, bytes).map_err(|err| library_error(origin, err))?;

        // SAFETY: running library initializers is inherent to loading
        // application modules; the file was produced by the application build.
        let library = unsafe { Library::new(&staged) }.map_err(|err| library_error(origin, err))?;

        // Fail at link time rather than at launch when the symbol is missing.
        // SAFETY: the symbol is only checked for presence here.
        unsafe { library.get::<EntryFn>(ENTRY_SYMBOL) }.map_err(|err| library_error(origin, err))?;

        let digest = format!("{:x}", Sha256::digest(bytes));
        info!(origin = %origin.display(), staged = %staged.display(), digest = %&digest[..12], "Loaded library module");

        Ok(Self {
            origin: origin.to_path_buf(),
            library,
            staging,
            digest,
            loaded_at: Instant::now(),
        })
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// SHA-256 of the loaded bytes, hex encoded
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }
}

impl Module for LibraryModule {
    fn run(&self, args: &[String]) -> anyhow::Result<()> {
        let owned = args
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .context("argument contains a NUL byte")?;
        let argv: Vec<*const c_char> = owned.iter().map(|arg| arg.as_ptr()).collect();

        // SAFETY: the symbol was resolved at load time with the `EntryFn`
        // signature, and `argv` outlives the call.
        let status = unsafe {
            let entry: Symbol<EntryFn> = self
                .library
                .get(ENTRY_SYMBOL)
                .with_context(|| format!("resolving entry symbol in {}", self.origin.display()))?;
            entry(argv.len(), argv.as_ptr())
        };

        if status != 0 {
            bail!("{} exited with status {status}", self.origin.display());
        }
        Ok(())
    }
}

impl fmt::Debug for LibraryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryModule")
            .field("origin", &self.origin)
            .field("staging", &self.staging.path())
            .field("digest", &self.digest)
            .finish()
    }
}

impl Drop for LibraryModule {
    fn drop(&mut self) {
        debug!(origin = %self.origin.display(), "Unloading library module");
    }
}

fn library_error(path: &Path, err: impl fmt::Display) -> LaunchError {
    LaunchError::Library {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Rebuild the argument vector passed to an exported entry point.
///
/// # Safety
///
/// `argv` must point to `argc` valid NUL-terminated strings.
pub unsafe fn collect_args(argc: usize, argv: *const *const c_char) -> Vec<String> {
    if argv.is_null() {
        return Vec::new();
    }
    (0..argc)
        .map(|i| {
            // SAFETY: upheld by the caller
            let arg = unsafe { std::ffi::CStr::from_ptr(*argv.add(i)) };
            arg.to_string_lossy().into_owned()
        })
        .collect()
}

/// Export `main` from a `cdylib` as a relaunchable module.
///
/// `main` must be a `fn(&[String]) -> anyhow::Result<()>`.
///
/// ```rust,ignore
/// fn main(args: &[String]) -> anyhow::Result<()> {
///     println!("serving with {args:?}");
///     Ok(())
/// }
///
/// relaunch_runtime::declare_entry!(main);
/// ```
#[macro_export]
macro_rules! declare_entry {
    ($main:path) => {
        /// # Safety
        ///
        /// `argv` must point to `argc` valid NUL-terminated strings.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn relaunch_main(
            argc: usize,
            argv: *const *const ::std::ffi::c_char,
        ) -> i32 {
            let args = unsafe { $crate::library::collect_args(argc, argv) };
            match ::std::panic::catch_unwind(|| $main(&args)) {
                Ok(Ok(())) => 0,
                Ok(Err(err)) => {
                    eprintln!("{err:#}");
                    1
                }
                Err(_) => 101,
            }
        }
    };
}

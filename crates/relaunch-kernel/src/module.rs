//! Executable modules and the content handles that name resolves to

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A unit of code that can serve as an application entry point.
///
/// In-process version tables hold these directly; shared libraries are
/// adapted into one by the runtime's linker.
pub trait Module: Send + Sync {
    /// Run the module as `main` with the program arguments.
    fn run(&self, args: &[String]) -> anyhow::Result<()>;
}

impl<F> Module for F
where
    F: Fn(&[String]) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, args: &[String]) -> anyhow::Result<()> {
        self(args)
    }
}

/// What a module name resolves to inside a code image
#[derive(Clone)]
pub enum Content {
    /// Compiled, in-process code
    Module(Arc<dyn Module>),
    /// A file on disk, typically a shared library
    File(PathBuf),
    /// Raw module bytes
    Bytes(Arc<[u8]>),
}

impl Content {
    /// Wrap an in-process module
    pub fn module<M: Module + 'static>(module: M) -> Self {
        Self::Module(Arc::new(module))
    }

    /// Wrap a plain function or closure as an in-process module
    pub fn from_fn<F>(main: F) -> Self
    where
        F: Fn(&[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Module(Arc::new(main))
    }

    /// Point at a file on disk
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::File(path.as_ref().to_path_buf())
    }

    /// Take ownership of raw bytes
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(Arc::from(bytes.into()))
    }

    pub fn as_module(&self) -> Option<&Arc<dyn Module>> {
        match self {
            Self::Module(module) => Some(module),
            _ => None,
        }
    }

    /// Read the raw bytes behind this content, `None` for compiled modules.
    pub fn read_bytes(&self) -> std::io::Result<Option<Cow<'_, [u8]>>> {
        match self {
            Self::Module(_) => Ok(None),
            Self::File(path) => Ok(Some(Cow::Owned(std::fs::read(path)?))),
            Self::Bytes(bytes) => Ok(Some(Cow::Borrowed(bytes))),
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(_) => f.write_str("Module(..)"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Module(a), Self::Module(b)) => Arc::ptr_eq(a, b),
            (Self::File(a), Self::File(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

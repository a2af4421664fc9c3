use std::path::PathBuf;

/// Errors raised while setting up or running a watcher
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WatchError {
    #[error("Notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Watcher is already running")]
    AlreadyRunning,
}

pub type WatchResult<T> = Result<T, WatchError>;

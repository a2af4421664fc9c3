//! Discovery of the bootstrap code locations and entry point

use std::thread::Thread;

use tracing::debug;

use crate::config::RestartConfig;
use crate::context;
use crate::error::InitializationError;
use crate::location::{CodeLocation, dedup_locations};
use crate::overlay::{Overlay, OverlayRecord};

/// Supplies what the controller captures once, at initialization.
pub trait Initializer: Send + Sync {
    /// Code locations of the bootstrap image, as seen from `thread`.
    fn initial_locations(&self, thread: &Thread) -> Result<Vec<CodeLocation>, InitializationError>;

    /// Module name of the entry point to relaunch.
    fn entry_point(&self, thread: &Thread) -> Result<String, InitializationError>;

    /// Changes recorded before the controller existed.
    fn initial_overlay(&self) -> Overlay {
        Overlay::new()
    }
}

/// Derives everything from the calling thread and [`RestartConfig`].
///
/// A thread already running inside a generation reuses that generation's
/// base locations; otherwise the configured `code_path` entries that are
/// existing directories are used, in order.
#[derive(Debug, Clone, Default)]
pub struct DefaultInitializer {
    config: RestartConfig,
}

impl DefaultInitializer {
    pub fn new(config: RestartConfig) -> Self {
        Self { config }
    }
}

impl Initializer for DefaultInitializer {
    fn initial_locations(&self, thread: &Thread) -> Result<Vec<CodeLocation>, InitializationError> {
        if let Some(image) = context::current() {
            debug!(thread = ?thread.name(), generation = image.generation(), "Using locations of the running generation");
            return Ok(image.base().to_vec());
        }

        let locations = dedup_locations(
            self.config
                .code_path
                .iter()
                .filter(|path| path.is_dir())
                .map(CodeLocation::directory),
        );
        if locations.is_empty() {
            return Err(InitializationError::LocationsUnavailable(format!(
                "none of the {} configured code path entries is a directory",
                self.config.code_path.len()
            )));
        }
        Ok(locations)
    }

    fn entry_point(&self, _thread: &Thread) -> Result<String, InitializationError> {
        let entry = self.config.entry_point.trim();
        if entry.is_empty() {
            return Err(InitializationError::EntryPointNotFound);
        }
        Ok(entry.to_string())
    }
}

/// Fixed locations, entry point and initial overlay
#[derive(Debug, Clone)]
pub struct StaticInitializer {
    locations: Vec<CodeLocation>,
    entry_point: String,
    overlay: Overlay,
}

impl StaticInitializer {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            locations: Vec::new(),
            entry_point: entry_point.into(),
            overlay: Overlay::new(),
        }
    }

    pub fn with_location(mut self, location: CodeLocation) -> Self {
        self.locations.push(location);
        self
    }

    /// Record a change that predates the controller.
    pub fn with_pending(mut self, record: OverlayRecord) -> Self {
        self.overlay.insert(record.name().to_string(), record);
        self
    }
}

impl Initializer for StaticInitializer {
    fn initial_locations(&self, _thread: &Thread) -> Result<Vec<CodeLocation>, InitializationError> {
        if self.locations.is_empty() {
            return Err(InitializationError::LocationsUnavailable(
                "no code locations were supplied".to_string(),
            ));
        }
        Ok(dedup_locations(self.locations.iter().cloned()))
    }

    fn entry_point(&self, _thread: &Thread) -> Result<String, InitializationError> {
        if self.entry_point.is_empty() {
            return Err(InitializationError::EntryPointNotFound);
        }
        Ok(self.entry_point.clone())
    }

    fn initial_overlay(&self) -> Overlay {
        self.overlay.clone()
    }
}

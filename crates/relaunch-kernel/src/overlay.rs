//! Overlay records, the accumulating overlay store and resolved code images

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use crate::location::{CodeLocation, dedup_locations};
use crate::module::Content;

/// One edit to a named module, applied on top of the base locations
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayRecord {
    /// Module did not exist in the previous image
    Added { name: String, content: Content },
    /// Module replaces an existing definition
    Modified { name: String, content: Content },
    /// Module no longer exists, even if a base location defines it
    Deleted { name: String },
}

impl OverlayRecord {
    pub fn added(name: impl Into<String>, content: Content) -> Self {
        Self::Added {
            name: name.into(),
            content,
        }
    }

    pub fn modified(name: impl Into<String>, content: Content) -> Self {
        Self::Modified {
            name: name.into(),
            content,
        }
    }

    pub fn deleted(name: impl Into<String>) -> Self {
        Self::Deleted { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Added { name, .. } | Self::Modified { name, .. } | Self::Deleted { name } => name,
        }
    }

    /// Content visible through this record, `None` for deletions.
    pub fn content(&self) -> Option<&Content> {
        match self {
            Self::Added { content, .. } | Self::Modified { content, .. } => Some(content),
            Self::Deleted { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Modified { .. } => "modified",
            Self::Deleted { .. } => "deleted",
        }
    }
}

/// Overlay keyed by module name
pub type Overlay = HashMap<String, OverlayRecord>;

/// Long-lived, shared accumulation of overlay records.
///
/// Never reset between restarts and never pruned: whoever pushes records is
/// responsible for bounding its growth.
#[derive(Debug, Default)]
pub struct OverlayStore {
    records: RwLock<Overlay>,
    revision: AtomicU64,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch; later records for the same name win.
    pub fn apply<I>(&self, batch: I) -> usize
    where
        I: IntoIterator<Item = OverlayRecord>,
    {
        let mut records = self.records.write();
        let mut applied = 0;
        for record in batch {
            trace!(module = record.name(), kind = record.kind(), "overlay record");
            records.insert(record.name().to_string(), record);
            applied += 1;
        }
        if applied > 0 {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
        applied
    }

    pub fn push(&self, record: OverlayRecord) {
        self.apply(std::iter::once(record));
    }

    /// Copy of the current records, detached from later mutation.
    pub fn snapshot(&self) -> Overlay {
        self.records.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<OverlayRecord> {
        self.records.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of non-empty batches applied so far
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

/// Immutable view of the code visible to one generation
#[derive(Debug, Clone)]
pub struct OverlayImage {
    generation: u64,
    base: Vec<CodeLocation>,
    overlay: Overlay,
}

impl OverlayImage {
    /// Build an image from base locations and an overlay snapshot.
    pub fn resolve(locations: &[CodeLocation], overlay: Overlay) -> Self {
        Self {
            generation: 0,
            base: dedup_locations(locations.iter().cloned()),
            overlay,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// What `name` resolves to: the overlay record if any, else the first
    /// base location defining it.
    pub fn lookup(&self, name: &str) -> Option<Content> {
        match self.overlay.get(name) {
            Some(record) => record.content().cloned(),
            None => self.base.iter().find_map(|location| location.find(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn base(&self) -> &[CodeLocation] {
        &self.base
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Overlay names, sorted, for diagnostics
    pub fn overlay_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.overlay.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

//! Directory snapshots and the overlay records between two of them

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::slice;
use std::time::SystemTime;

use relaunch_kernel::{Content, OverlayRecord};
use sha2::{Digest, Sha256};
use tracing::trace;
use walkdir::WalkDir;

use crate::config::WatchConfig;

/// State of one file when the snapshot was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub modified: Option<SystemTime>,
    pub len: u64,
    /// SHA-256 of the contents, hex encoded
    pub digest: String,
}

/// Files under one root, keyed by module name (`/`-separated relative path)
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: PathBuf,
    files: BTreeMap<String, FileEntry>,
}

impl Snapshot {
    /// Snapshot with no files, for a root that does not exist yet
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: BTreeMap::new(),
        }
    }

    /// Walk `root` and record every watched file.
    ///
    /// Unchanged files (same timestamp and length as in `previous`) keep
    /// their previous digest instead of being read again.
    pub fn take(root: &Path, config: &WatchConfig, previous: Option<&Snapshot>) -> io::Result<Self> {
        let max_depth = if config.recursive { usize::MAX } else { 1 };
        let mut files = BTreeMap::new();

        for entry in WalkDir::new(root).max_depth(max_depth).follow_links(true) {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() || !config.should_watch(entry.path()) {
                continue;
            }
            let Some(name) = module_name(root, entry.path()) else {
                continue;
            };

            let metadata = entry.metadata().map_err(io::Error::other)?;
            let modified = metadata.modified().ok();
            let len = metadata.len();

            let reused = previous
                .and_then(|snapshot| snapshot.files.get(&name))
                .filter(|known| known.modified.is_some() && known.modified == modified && known.len == len)
                .map(|known| known.digest.clone());
            let digest = match reused {
                Some(digest) => digest,
                None => hex_digest(&std::fs::read(entry.path())?),
            };

            files.insert(name, FileEntry { modified, len, digest });
        }

        trace!(root = %root.display(), files = files.len(), "Took snapshot");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    /// Records turning `self` into `newer`, in name order.
    ///
    /// A file counts as modified only when its contents changed.
    pub fn diff(&self, newer: &Snapshot) -> Vec<OverlayRecord> {
        diff_layers(slice::from_ref(self), slice::from_ref(newer))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Records turning the merged view of `older` into that of `newer`.
///
/// Both slices hold the same roots in lookup order. A name resolves to the
/// first root that has it, so changes under a shadowed root produce nothing.
pub fn diff_layers(older: &[Snapshot], newer: &[Snapshot]) -> Vec<OverlayRecord> {
    let before = merged(older);
    let after = merged(newer);
    let mut records = Vec::new();

    for name in before.keys() {
        if !after.contains_key(name) {
            records.push(OverlayRecord::deleted(*name));
        }
    }

    for (name, (root, entry)) in &after {
        let content = Content::file(root.join(name));
        match before.get(name) {
            None => records.push(OverlayRecord::added(*name, content)),
            Some((previous_root, previous)) if previous_root != root || previous.digest != entry.digest => {
                records.push(OverlayRecord::modified(*name, content));
            }
            Some(_) => {}
        }
    }

    records
}

/// Winning root and entry per name, first root first
fn merged(snapshots: &[Snapshot]) -> BTreeMap<&str, (&Path, &FileEntry)> {
    let mut view = BTreeMap::new();
    for snapshot in snapshots {
        for (name, entry) in &snapshot.files {
            view.entry(name.as_str()).or_insert((snapshot.root.as_path(), entry));
        }
    }
    view
}

fn module_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn hex_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

//! Code locations
//!
//! A [`CodeLocation`] is a place modules are looked up in: a directory on
//! disk, or an in-process [`ModuleTable`] acting as a compiled version table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::module::Content;

/// Named, in-process table of modules.
///
/// Two tables are the same location when they carry the same name.
#[derive(Clone)]
pub struct ModuleTable {
    name: Arc<str>,
    modules: Arc<HashMap<String, Content>>,
}

impl ModuleTable {
    /// Create an empty table
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            modules: Arc::new(HashMap::new()),
        }
    }

    /// Add or replace a module
    pub fn with(mut self, name: impl Into<String>, content: Content) -> Self {
        Arc::make_mut(&mut self.modules).insert(name.into(), content);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Content> {
        self.modules.get(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ModuleTable")
            .field("name", &self.name)
            .field("modules", &names)
            .finish()
    }
}

impl PartialEq for ModuleTable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ModuleTable {}

impl Hash for ModuleTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A source of loadable code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodeLocation {
    /// Module `n` is the file `<dir>/n`
    Directory(PathBuf),
    /// Module `n` is the table entry `n`
    Table(ModuleTable),
}

impl CodeLocation {
    pub fn directory(path: impl AsRef<Path>) -> Self {
        Self::Directory(path.as_ref().to_path_buf())
    }

    pub fn table(table: ModuleTable) -> Self {
        Self::Table(table)
    }

    /// Look a module up in this location only.
    pub fn find(&self, name: &str) -> Option<Content> {
        match self {
            Self::Directory(dir) => {
                let relative = Path::new(name);
                // Names never escape the directory they are resolved against
                if relative
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_)))
                {
                    return None;
                }
                let path = dir.join(relative);
                path.is_file().then(|| Content::File(path))
            }
            Self::Table(table) => table.get(name).cloned(),
        }
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(path) => write!(f, "{}", path.display()),
            Self::Table(table) => write!(f, "table:{}", table.name()),
        }
    }
}

/// Remove duplicate locations, keeping the first occurrence of each.
pub fn dedup_locations<I>(locations: I) -> Vec<CodeLocation>
where
    I: IntoIterator<Item = CodeLocation>,
{
    let mut seen = HashSet::new();
    locations
        .into_iter()
        .filter(|location| seen.insert(location.clone()))
        .collect()
}

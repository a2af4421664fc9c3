//! Watch configuration

use std::path::Path;
use std::time::Duration;

use relaunch_kernel::RestartConfig;

/// Which files are watched and how long to wait before restarting
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period after the last event before changes are collected
    pub restart_delay: Duration,
    /// File extensions to watch, all files when empty
    pub extensions: Vec<String>,
    /// Whether subdirectories are watched
    pub recursive: bool,
    /// Ignored file names: `*suffix`, `prefix*` or an exact name
    pub ignore_patterns: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(1),
            extensions: Vec::new(),
            recursive: true,
            ignore_patterns: vec!["*.tmp".to_string(), "*.swp".to_string(), "*~".to_string()],
        }
    }
}

impl WatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the restart delay from the controller configuration.
    pub fn from_restart_config(config: &RestartConfig) -> Self {
        Self::default().with_restart_delay(config.restart_delay())
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.extensions.push(ext.trim_start_matches('.').to_string());
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_ignore(mut self, pattern: &str) -> Self {
        self.ignore_patterns.push(pattern.to_string());
        self
    }

    /// Whether changes to `path` are of interest
    pub fn should_watch(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !self.extensions.is_empty() && !self.extensions.iter().any(|e| e == ext) {
            return false;
        }

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        !self.ignore_patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix('*') {
                file_name.ends_with(suffix)
            } else if let Some(prefix) = pattern.strip_suffix('*') {
                file_name.starts_with(prefix)
            } else {
                file_name == pattern
            }
        })
    }
}

//! Restart configuration
//!
//! [`RestartConfig`] is layered from three sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional file (YAML, TOML, JSON, INI, RON or JSON5, detected from
//!    the extension) with `${VAR}` / `$VAR` substitution
//! 3. `RELAUNCH_` prefixed environment variables, e.g.
//!    `RELAUNCH_ENTRY_POINT=main` or `RELAUNCH_CODE_PATH=target/a:target/b`

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};


/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RELAUNCH";

static BRACED_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));
static SIMPLE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid regex"));

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings of the restart controller and the bundled watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Module name of the application entry point
    pub entry_point: String,
    /// Directories holding the application's modules
    pub code_path: Vec<PathBuf>,
    /// Quiet period after the last file event before restarting
    pub restart_delay_ms: u64,
    /// Name prefix of leak-safe worker threads
    pub worker_name: String,
    /// Name of each generation's main thread
    pub launcher_thread_name: String,
    /// Whether the reclaim hook runs between stop and relaunch
    pub reclaim_hint: bool,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            entry_point: "main".to_string(),
            code_path: Vec::new(),
            restart_delay_ms: 1000,
            worker_name: "leak-safe-worker".to_string(),
            launcher_thread_name: "restartedMain".to_string(),
            reclaim_hint: true,
        }
    }
}

impl RestartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_code_path(mut self, path: impl AsRef<Path>) -> Self {
        self.code_path.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_reclaim_hint(mut self, enabled: bool) -> Self {
        self.reclaim_hint = enabled;
        self
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Defaults overridden by `RELAUNCH_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        build(Cfg::builder().add_source(environment()))
    }

    /// Defaults, then `path`, then `RELAUNCH_*` environment variables.
    pub fn load(path: &str) -> ConfigResult<Self> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content);

        build(
            Cfg::builder()
                .add_source(File::from_str(&substituted, format))
                .add_source(environment()),
        )
    }

    /// Parse from a string with an explicit format, without environment overrides.
    pub fn from_str(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let substituted = substitute_env_vars(content);
        build(Cfg::builder().add_source(File::from_str(&substituted, format)))
    }
}

fn environment() -> Environment {
    let list_separator = if cfg!(windows) { ";" } else { ":" };
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(list_separator)
        .with_list_parse_key("code_path")
}

fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ConfigResult<RestartConfig> {
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Detect configuration format from file extension
///
/// # Supported Extensions
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
/// - INI: `.ini`
/// - RON: `.ron`
/// - JSON5: `.json5`
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// Supports both `${VAR_NAME}` and `$VAR_NAME`. Unknown variables are left
/// untouched.
pub fn substitute_env_vars(content: &str) -> String {
    let result = BRACED_VAR
        .replace_all(content, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string();

    SIMPLE_VAR
        .replace_all(&result, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .to_string()
}

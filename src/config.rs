//! Configuration module for the archive watcher.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `JARPATCH_` and use double
//! underscores to separate nested levels:
//! - `JARPATCH_WATCH__RECURSIVE=true` sets `watch.recursive`
//! - `JARPATCH_WATCH__EXTENSIONS=[jar]` sets `watch.extensions`
//! - `JARPATCH_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "jarpatch.toml";

const ENV_PREFIX: &str = "JARPATCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Which directories to watch and which files count as archives
    #[serde(default)]
    pub watch: WatchConfig,

    /// Entries injected into every patched archive
    #[serde(default)]
    pub payload: PayloadConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Root directories, in order
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Watch every directory beneath each root, including ones created later
    #[serde(default)]
    pub recursive: bool,

    /// File extensions (without the dot) treated as archives
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct PayloadConfig {
    /// Archive entry name -> file whose bytes become the entry content.
    ///
    /// Empty means the built-in payload is used.
    #[serde(default)]
    pub entries: IndexMap<String, PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level applied to every target without an override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `jarpatch::watcher = "debug"`
    #[serde(default)]
    pub modules: IndexMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_extensions() -> Vec<String> {
    vec!["zip".to_string(), "jar".to_string()]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            watch: WatchConfig::default(),
            payload: PayloadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            recursive: false,
            extensions: default_extensions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: IndexMap::new(),
        }
    }
}

impl WatchConfig {
    /// Whether `path` carries one of the configured archive extensions.
    ///
    /// Comparison ignores ASCII case, so `App.JAR` matches `jar`.
    pub fn is_archive(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// Uses `path` when given, otherwise `./jarpatch.toml` if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<figment::Error>> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, layering env vars on top.
    ///
    /// A missing file is not an error; defaults and env vars still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore becomes a dot, single underscores stay in field names
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file at `path`.
    pub fn init_config_file(
        path: impl AsRef<Path>,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = path.as_ref().to_path_buf();

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

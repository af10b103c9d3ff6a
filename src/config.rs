//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::index::DEFAULT_DATABASE_NAME;
use crate::query::DEFAULT_MAX_OPEN_FILES;
use crate::storage::{Mjd, EARLIEST_ACCEPTABLE_MJD, RECORDING_SUFFIXES};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Archive configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Directory holding the recording files and the catalog
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Name of the catalog database inside `data_dir`
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Open and catalogue files that are not in the catalog yet
    #[serde(default = "default_update_database")]
    pub update_database: bool,

    /// Timestamps before this are treated as unset
    #[serde(default = "default_earliest_acceptable_mjd")]
    pub earliest_acceptable_mjd: Mjd,

    #[serde(default = "default_file_suffixes")]
    pub file_suffixes: Vec<String>,

    /// How many recording files may be kept open at once
    #[serde(default = "default_max_open_files")]
    pub max_open_files: usize,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("stripdb").to_string_lossy().to_string())
        .unwrap_or_else(|| "./stripdb_data".to_string())
}

fn default_database_name() -> String {
    DEFAULT_DATABASE_NAME.to_string()
}

fn default_update_database() -> bool {
    true
}

fn default_earliest_acceptable_mjd() -> Mjd {
    EARLIEST_ACCEPTABLE_MJD
}

fn default_file_suffixes() -> Vec<String> {
    RECORDING_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

fn default_max_open_files() -> usize {
    DEFAULT_MAX_OPEN_FILES
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_name: default_database_name(),
            update_database: default_update_database(),
            earliest_acceptable_mjd: default_earliest_acceptable_mjd(),
            file_suffixes: default_file_suffixes(),
            max_open_files: default_max_open_files(),
        }
    }
}

impl ArchiveConfig {
    /// Configuration for the archive stored in `data_dir`, other settings
    /// left to their defaults
    pub fn for_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_string_lossy().to_string(),
            ..Self::default()
        }
    }

    /// The data directory, with a leading `~` expanded
    pub fn data_path(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.data_dir)),
            None => PathBuf::from(&self.data_dir),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("stripdb").join("config.toml")),
            Some(PathBuf::from("/etc/stripdb/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Archive overrides
        if let Some(data_dir) = var("STRIPDB_DATA_DIR") {
            self.archive.data_dir = data_dir;
        }
        if let Some(name) = var("STRIPDB_DATABASE_NAME") {
            self.archive.database_name = name;
        }

        // Logging overrides
        if let Some(level) = var("STRIPDB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("STRIPDB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# stripdb Configuration
#
# Environment variables override these settings:
# - STRIPDB_DATA_DIR
# - STRIPDB_DATABASE_NAME
# - STRIPDB_LOG_LEVEL
# - STRIPDB_LOG_FORMAT

[archive]
# Directory containing the recording files
data_dir = "~/.local/share/stripdb"

# Catalog database, created inside data_dir
database_name = "index.db"

# Index new files when the archive is opened; when false new files are
# only reported
update_database = true

# Timestamps before this MJD (2018-01-01) mark files that were never closed
earliest_acceptable_mjd = 58119.0

# Recording file name suffixes
file_suffixes = [".rec", ".rec.lz4"]

# Maximum number of recording files kept open by queries
max_open_files = 16

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

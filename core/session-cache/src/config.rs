//! Configuration loading for the session cache.
//!
//! The config file is optional TOML; every field has a default, so a missing
//! file or a partial one is fine:
//!
//! ```toml
//! [store]
//! path = "/var/lib/conformance/validator-sessions.db"
//! busy_timeout_ms = 5000
//! journal_mode = "wal"
//! synchronous = "normal"
//! ```

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{CacheError, Result};

const APP_DIR: &str = "validator-session-cache";
const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "sessions.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Overrides the database path from the config file.
pub const DB_PATH_ENV: &str = "VALIDATOR_SESSION_CACHE_DB";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; `None` means the platform data directory.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    pub synchronous: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            synchronous: SyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Store settings for an explicit database file, defaults elsewhere.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Configured database path, or the platform default.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => default_db_path(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(path) = env::var_os(DB_PATH_ENV).filter(|value| !value.is_empty()) {
            self.path = Some(PathBuf::from(path));
        }
    }
}

/// SQLite `journal_mode` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Readers never block the writer.
    #[default]
    Wal,
    Delete,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
        }
    }
}

/// SQLite `synchronous` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    #[default]
    Normal,
}

impl SyncMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            SyncMode::Full => "FULL",
            SyncMode::Normal => "NORMAL",
        }
    }
}

/// Returns `<config dir>/validator-session-cache/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .ok_or(CacheError::NoDefaultPath("config file"))
}

/// Returns `<data dir>/validator-session-cache/sessions.db`.
pub fn default_db_path() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR).join(DB_FILE))
        .ok_or(CacheError::NoDefaultPath("session database"))
}

/// Loads the config at `path` (or the default location), then applies
/// environment overrides.
///
/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_config(path: Option<PathBuf>) -> Result<CacheConfig> {
    let mut config = read_config_file(path)?;
    config.store.apply_env_overrides();
    Ok(config)
}

fn read_config_file(path: Option<PathBuf>) -> Result<CacheConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(CacheConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| CacheError::ConfigRead {
        path: config_path.clone(),
        source,
    })?;
    toml::from_str::<CacheConfig>(&content).map_err(|err| CacheError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

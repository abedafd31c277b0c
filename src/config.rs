//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSEXP_CONFIG` (environment variable)
//! 2. `~/.config/mailsexp/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailsexp\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Summary database settings.
    pub store: StoreConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for indexes and logs.
    pub cache_dir: Option<PathBuf>,
}

/// Search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Expression used when none is given on the command line.
    pub default_expression: String,
    /// Build a body word index before searching.
    pub use_body_index: bool,
    /// Join reply roots to earlier roots with the same subject.
    pub thread_subject_grouping: bool,
    /// Maximum number of parsed messages kept in the LRU cache.
    pub max_cached_messages: usize,
}

/// Summary database settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file holding folder summaries. Without it every search runs
    /// in memory.
    pub database: Option<PathBuf>,
    /// Never delegate searches to the database.
    pub in_memory_only: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_expression: crate::search::MATCH_ALL.to_string(),
            use_body_index: true,
            thread_subject_grouping: true,
            max_cached_messages: crate::store::reader::DEFAULT_CACHE_SIZE,
        }
    }
}

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from an explicit file, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSEXP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailsexp").join("config.toml"))
}

/// Return the cache directory for indexes, logs, etc.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsexp")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailsexp.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.search.default_expression, "(match-all)");
        assert!(cfg.search.use_body_index);
        assert_eq!(cfg.search.max_cached_messages, 50);
        assert!(cfg.store.database.is_none());
        assert!(!cfg.store.in_memory_only);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[search]
use_body_index = false

[store]
database = "/tmp/summaries.db"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert!(!cfg.search.use_body_index);
        assert_eq!(cfg.store.database, Some(PathBuf::from("/tmp/summaries.db")));
        assert!(cfg.search.thread_subject_grouping);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_cache_dir_override() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mailsexp-cache"));
        assert_eq!(cache_dir(&cfg), PathBuf::from("/tmp/mailsexp-cache"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/mailsexp-cache/mailsexp.log")
        );
    }
}

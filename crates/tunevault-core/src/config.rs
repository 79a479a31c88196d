//! Library configuration management.
//!
//! Handles loading, saving, and defaulting the settings that wire the
//! pipeline together: where the library and repository live, which external
//! commands provide analysis and transport, and the retry/cache tuning.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::generator::{DEFAULT_FINGERPRINT_TTL_SECS, DEFAULT_WINDOW_SECS};
use crate::retriever::{DEFAULT_RETRIES, DEFAULT_SAMPLE_SECS, RETRY_BASE_DELAY_MS};

/// Default analyzer command.
pub const DEFAULT_ANALYZER_COMMAND: &str = "fpcalc";

/// Default downloader command.
pub const DEFAULT_FETCHER_COMMAND: &str = "tunevault-fetch";

/// Default full-content quality in kbps.
pub const DEFAULT_QUALITY: u32 = 192;

const fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

const fn default_retry_base_delay_ms() -> u64 {
    RETRY_BASE_DELAY_MS
}

const fn default_window_secs() -> u32 {
    DEFAULT_WINDOW_SECS
}

const fn default_ttl_secs() -> u64 {
    DEFAULT_FINGERPRINT_TTL_SECS
}

const fn default_sample_secs() -> u32 {
    DEFAULT_SAMPLE_SECS
}

const fn default_quality() -> u32 {
    DEFAULT_QUALITY
}

const fn default_true() -> bool {
    true
}

fn default_analyzer_command() -> String {
    DEFAULT_ANALYZER_COMMAND.to_string()
}

fn default_fetcher_command() -> String {
    DEFAULT_FETCHER_COMMAND.to_string()
}

fn default_library_dir() -> PathBuf {
    default_data_directory().join("library")
}

fn default_data_file() -> PathBuf {
    default_data_directory().join("library.json")
}

fn default_temp_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunevault")
        .join("tmp")
}

/// Platform default data directory for the library.
#[must_use]
pub fn default_data_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("tunevault")
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Directory holding stored content files.
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    /// Path of the repository's primary JSON file.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Directory for sample downloads and other temp files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Analyzer command producing fingerprints.
    #[serde(default = "default_analyzer_command")]
    pub analyzer_command: String,

    /// Downloader command fetching samples and full content.
    #[serde(default = "default_fetcher_command")]
    pub fetcher_command: String,

    /// Fetch attempts per item.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Base delay for retry backoff, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Fingerprint analysis window in seconds.
    #[serde(default = "default_window_secs")]
    pub fingerprint_window_secs: u32,

    /// Fingerprint cache time-to-live in seconds.
    #[serde(default = "default_ttl_secs")]
    pub fingerprint_ttl_secs: u64,

    /// Whether the fingerprint cache is consulted.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Sample length in seconds.
    #[serde(default = "default_sample_secs")]
    pub sample_duration_secs: u32,

    /// Requested full-content quality in kbps.
    #[serde(default = "default_quality")]
    pub quality: u32,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            library_dir: default_library_dir(),
            data_file: default_data_file(),
            temp_dir: default_temp_dir(),
            analyzer_command: default_analyzer_command(),
            fetcher_command: default_fetcher_command(),
            retries: DEFAULT_RETRIES,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            fingerprint_window_secs: DEFAULT_WINDOW_SECS,
            fingerprint_ttl_secs: DEFAULT_FINGERPRINT_TTL_SECS,
            cache_enabled: true,
            sample_duration_secs: DEFAULT_SAMPLE_SECS,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl LibraryConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root all paths under the given directory. Convenient for tests and
    /// portable installs.
    #[must_use]
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            library_dir: root.join("library"),
            data_file: root.join("library.json"),
            temp_dir: root.join("tmp"),
            ..Self::default()
        }
    }

    /// Set the library directory.
    #[must_use]
    pub fn with_library_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_dir = path.into();
        self
    }

    /// Set the repository data file.
    #[must_use]
    pub fn with_data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = path.into();
        self
    }

    /// Set the analyzer command.
    #[must_use]
    pub fn with_analyzer_command(mut self, command: impl Into<String>) -> Self {
        self.analyzer_command = command.into();
        self
    }

    /// Set the fetcher command.
    #[must_use]
    pub fn with_fetcher_command(mut self, command: impl Into<String>) -> Self {
        self.fetcher_command = command.into();
        self
    }

    /// Set the fetch retry budget.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Load a configuration from a JSON file.
    ///
    /// A missing or corrupt file yields the defaults (with a warning), so a
    /// damaged config never blocks a sync.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "Config file {} is invalid ({}), using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    "Config file {} is unreadable ({}), using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::file_access(parent, &e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::file_access(path, &e))?;
        debug!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LibraryConfig::default();
        assert_eq!(config.retries, DEFAULT_RETRIES);
        assert_eq!(config.analyzer_command, "fpcalc");
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_rooted_at_places_paths_under_root() {
        let config = LibraryConfig::rooted_at("/data/tunevault");
        assert_eq!(config.library_dir, PathBuf::from("/data/tunevault/library"));
        assert_eq!(
            config.data_file,
            PathBuf::from("/data/tunevault/library.json")
        );
        assert_eq!(config.temp_dir, PathBuf::from("/data/tunevault/tmp"));
    }

    #[test]
    fn test_builders() {
        let config = LibraryConfig::new()
            .with_analyzer_command("chromaprint")
            .with_retries(5);
        assert_eq!(config.analyzer_command, "chromaprint");
        assert_eq!(config.retries, 5);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let config = LibraryConfig::rooted_at(dir.path()).with_retries(7);

        config.save(&path).unwrap();
        let loaded = LibraryConfig::load(&path);
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config, LibraryConfig::default());
    }

    #[test]
    fn test_load_corrupt_file_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        let config = LibraryConfig::load(&path);
        assert_eq!(config, LibraryConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "retries": 9 }"#).unwrap();
        let config = LibraryConfig::load(&path);
        assert_eq!(config.retries, 9);
        assert_eq!(config.analyzer_command, "fpcalc");
    }
}

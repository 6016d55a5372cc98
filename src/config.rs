//! Configuration file parser for `~/.config/podscrape/config.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings, since they are usually
//! typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which object store backend holds the catalog and episode indexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One directory per bucket under `data_dir`
    #[default]
    Files,
    /// `data_dir/podscrape.db`
    Sqlite,
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for store data.
    pub data_dir: PathBuf,

    /// Where audio files land. Defaults to `{data_dir}/audio`.
    pub audio_dir: Option<PathBuf>,

    pub storage_backend: StorageBackend,

    /// Cap on entries considered per feed, taken from the front of the feed in
    /// document order. A podcast's own cap overrides it.
    pub max_episodes_per_feed: usize,

    pub download_audio: bool,

    /// Podcasts scraped at once by `scrape_all_podcasts`.
    pub scrape_concurrency: usize,

    pub connect_timeout_secs: u64,

    /// Per-read timeout, not a whole-request deadline.
    pub read_timeout_secs: u64,

    /// Feed documents larger than this are rejected.
    pub max_feed_bytes: usize,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            audio_dir: None,
            storage_backend: StorageBackend::Files,
            max_episodes_per_feed: 5,
            download_audio: true,
            scrape_concurrency: 4,
            connect_timeout_secs: 10,
            read_timeout_secs: 120,
            max_feed_bytes: 10 * 1024 * 1024,
            user_agent: concat!("podscrape/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "data_dir",
        "audio_dir",
        "storage_backend",
        "max_episodes_per_feed",
        "download_audio",
        "scrape_concurrency",
        "connect_timeout_secs",
        "read_timeout_secs",
        "max_feed_bytes",
        "user_agent",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            data_dir = %config.data_dir.display(),
            backend = ?config.storage_backend,
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.audio_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("audio"))
    }

    /// Path of the SQLite database when `storage_backend = "sqlite"`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("podscrape.db")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Effective pool size; zero would stall the batch.
    pub fn scrape_concurrency(&self) -> usize {
        self.scrape_concurrency.max(1)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Configuration types for download operations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lowest number of concurrent workers a run will use.
pub const MIN_CONCURRENCY: usize = 1;
/// Highest number of concurrent workers a run will use.
pub const MAX_CONCURRENCY: usize = 8;

/// Compression applied to archive entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Entries are stored as-is. Media is usually compressed already.
    #[default]
    Stored,
    /// Entries are deflated.
    Deflated,
}

/// Configuration for download operations.
///
/// `concurrency` and `retries` are signed so that out-of-range values from
/// config files or callers can be normalized instead of rejected; see
/// [`clamp_concurrency`] and [`clamp_retries`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Number of concurrent item downloads.
    pub concurrency: i64,
    /// Number of retries per network item after the first attempt.
    pub retries: i64,
    /// Base delay for exponential backoff between attempts, in milliseconds.
    pub backoff_base_ms: u64,
    /// Optional per-request timeout, in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Compression used for archive entries.
    pub compression: Compression,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retries: 3,
            backoff_base_ms: 200,
            request_timeout_secs: None,
            compression: Compression::Stored,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of concurrent downloads.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the number of retries per item.
    #[must_use]
    pub const fn with_retries(mut self, retries: i64) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the backoff base delay in milliseconds.
    #[must_use]
    pub const fn with_backoff_base_ms(mut self, millis: u64) -> Self {
        self.backoff_base_ms = millis;
        self
    }

    /// Sets the per-request timeout in seconds.
    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Sets the archive entry compression.
    #[must_use]
    pub const fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Returns the concurrency after clamping.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        clamp_concurrency(self.concurrency)
    }

    /// Returns the retry count after clamping.
    #[must_use]
    pub fn effective_retries(&self) -> u32 {
        clamp_retries(self.retries)
    }
}

/// Clamps a requested concurrency into `[MIN_CONCURRENCY, MAX_CONCURRENCY]`.
#[must_use]
pub fn clamp_concurrency(requested: i64) -> usize {
    usize::try_from(requested)
        .unwrap_or(MIN_CONCURRENCY)
        .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Clamps a requested retry count to a non-negative value.
#[must_use]
pub fn clamp_retries(requested: i64) -> u32 {
    if requested <= 0 {
        0
    } else {
        u32::try_from(requested).unwrap_or(u32::MAX)
    }
}

/// Path configuration for output and configuration directories.
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Directory where finished archives and single files are saved.
    pub output_dir: PathBuf,
    /// Directory where `config.toml` is read from.
    pub config_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            output_dir: PathBuf::from("."),
            config_dir: config_dir.join("media-bundle"),
        }
    }
}

impl PathConfig {
    /// Returns the path of the configuration file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// On-disk layout of `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    download: DownloadConfig,
    output_dir: Option<PathBuf>,
}

/// Complete application configuration combining download and path settings.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Download configuration.
    pub download: DownloadConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from the default config file, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let paths = PathConfig::default();
        Self::load_from(&paths.config_file(), paths)
    }

    /// Loads configuration from `path`, falling back to defaults when the
    /// file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path, paths: PathConfig) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self {
                download: DownloadConfig::default(),
                paths,
            });
        }
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;
        if config.paths.output_dir == PathBuf::from(".") {
            config.paths.output_dir = paths.output_dir;
        }
        config.paths.config_dir = paths.config_dir;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid configuration.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        let mut paths = PathConfig::default();
        if let Some(dir) = file.output_dir {
            paths.output_dir = dir;
        }
        Ok(Self {
            download: file.download,
            paths,
        })
    }
}

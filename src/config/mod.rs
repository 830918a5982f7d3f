//! Configuration types for acquisition and download operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Service key sent in the `Session-Key` header of licensing requests.
pub const DEFAULT_SESSION_KEY: &str = "acea0b1d-62b9-4fb7-960b-06d9fbb4999d";

/// Endpoints and keys of the content platform and its licensing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the content platform (hosts the listen endpoint).
    pub platform_url: String,
    /// Platform slug used in licensing account paths (`{slug}-{author_id}`).
    pub platform_slug: String,
    /// Base URL of the licensing API.
    pub license_api_url: String,
    /// Value of the `Session-Key` header.
    pub session_key: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            platform_url: "https://www.scribd.com".to_string(),
            platform_slug: "scribd".to_string(),
            license_api_url: "https://api.findawayworld.com".to_string(),
            session_key: DEFAULT_SESSION_KEY.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Points both the platform and the licensing API at one base URL.
    ///
    /// Useful for tests against a local mock server.
    #[must_use]
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        self.platform_url.clone_from(&base);
        self.license_api_url = base;
        self
    }

    /// Sets the `Session-Key` header value.
    #[must_use]
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = key.into();
        self
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User agent sent with every request.
    pub user_agent: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-read timeout in seconds (applies to streamed bodies too).
    pub read_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("audiobook-dl/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 15,
            read_timeout_secs: 60,
        }
    }
}

/// Retry policy with exponential backoff.
///
/// `max_attempts` counts retries after the first try, so `0` disables
/// retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of retries after the first attempt.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for the delay between retries, in milliseconds.
    pub max_delay_ms: u64,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Sets the number of retries.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub const fn with_initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Largest delay between retries.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Configuration for download operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory where chapter files are written.
    pub output_dir: PathBuf,
    /// File extension of chapter files, without the dot.
    pub extension: String,
    /// Number of concurrent track downloads.
    pub concurrent_tracks: usize,
    /// Whether to overwrite existing chapter files.
    pub force_overwrite: bool,
    /// Whether to remove `.part` files when a track fails.
    pub cleanup_on_error: bool,
    /// Whether to continue a leftover `.part` file with a ranged request.
    pub resume_partial: bool,
    /// Whether the first failed track aborts the remaining ones.
    pub fail_fast: bool,
    /// Per-track retry policy.
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            extension: "mp3".to_string(),
            concurrent_tracks: 3,
            force_overwrite: false,
            cleanup_on_error: true,
            resume_partial: true,
            fail_fast: false,
            retry: RetryConfig::default(),
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the number of concurrent track downloads.
    #[must_use]
    pub const fn with_concurrent_tracks(mut self, concurrent: usize) -> Self {
        self.concurrent_tracks = concurrent;
        self
    }

    /// Sets whether to force overwrite existing files.
    #[must_use]
    pub const fn with_force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    /// Sets whether to clean up `.part` files on download error.
    #[must_use]
    pub const fn with_cleanup_on_error(mut self, cleanup: bool) -> Self {
        self.cleanup_on_error = cleanup;
        self
    }

    /// Sets whether leftover `.part` files are resumed.
    #[must_use]
    pub const fn with_resume_partial(mut self, resume: bool) -> Self {
        self.resume_partial = resume;
        self
    }

    /// Sets whether the first failure aborts the run.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Sets the per-track retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Platform and licensing endpoints.
    pub service: ServiceConfig,
    /// HTTP client settings.
    pub http: HttpConfig,
    /// Download settings.
    pub download: DownloadConfig,
    /// Retry policy for the license exchange. Disabled by default.
    pub license_retry: RetryConfig,
    /// Cookie/header bag used for the page fetch and the listen request.
    pub credentials: Credentials,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            http: HttpConfig::default(),
            download: DownloadConfig::default(),
            license_retry: RetryConfig::disabled(),
            credentials: Credentials::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("audiobook-dl").join("config.toml"))
    }

    /// Loads configuration from `path`, or from [`default_path`](Self::default_path)
    /// when it exists, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an explicitly given file cannot be read,
    /// or if any file that is read fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(default) if default.is_file() => Self::from_file(&default),
            _ => Ok(Self::new()),
        }
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from TOML text. Missing sections take defaults.
    ///
    /// # Errors
    ///
    /// Returns the TOML parse error.
    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

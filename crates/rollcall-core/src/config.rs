//! Configuration management for Rollcall.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/rollcall/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Run pacing and batching
    pub scraping: ScrapingConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Work-queue store settings
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load configuration from the default location, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, falling back to defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `ROLLCALL_MAX_PROFILES`: cap on targets per run (0 = all)
    /// - `ROLLCALL_BATCH_SIZE`: targets between batch pauses
    /// - `ROLLCALL_MIN_DELAY` / `ROLLCALL_MAX_DELAY`: base delay range in seconds
    /// - `ROLLCALL_HEADLESS`: browser headless mode (true/false)
    /// - `ROLLCALL_DATABASE`: path of the work-queue database
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(max) = env_parse("ROLLCALL_MAX_PROFILES") {
            self.scraping.max_targets = max;
            tracing::debug!("Override scraping.max_targets from env: {}", max);
        }

        if let Some(size) = env_parse("ROLLCALL_BATCH_SIZE") {
            self.scraping.batch_size = size;
            tracing::debug!("Override scraping.batch_size from env: {}", size);
        }

        if let Some(delay) = env_parse("ROLLCALL_MIN_DELAY") {
            self.scraping.min_delay_secs = delay;
            tracing::debug!("Override scraping.min_delay_secs from env: {}", delay);
        }

        if let Some(delay) = env_parse("ROLLCALL_MAX_DELAY") {
            self.scraping.max_delay_secs = delay;
            tracing::debug!("Override scraping.max_delay_secs from env: {}", delay);
        }

        if let Some(headless) = env_parse("ROLLCALL_HEADLESS") {
            self.browser.headless = headless;
            tracing::debug!("Override browser.headless from env: {}", headless);
        }

        if let Ok(path) = std::env::var("ROLLCALL_DATABASE") {
            if !path.trim().is_empty() {
                tracing::debug!("Override store.database_path from env: {}", path);
                self.store.database_path = Some(PathBuf::from(path));
            }
        }

        self
    }

    /// Check values that would make a run misbehave.
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.scraping;
        for (field, value) in [
            ("scraping.min_delay_secs", s.min_delay_secs),
            ("scraping.max_delay_secs", s.max_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, "must be a non-negative number of seconds"));
            }
        }
        if s.min_delay_secs > s.max_delay_secs {
            return Err(invalid(
                "scraping.min_delay_secs",
                "must not exceed scraping.max_delay_secs",
            ));
        }
        if self.store.write_attempts == 0 {
            return Err(invalid("store.write_attempts", "must be at least 1"));
        }
        if self.browser.base_url.trim().is_empty() {
            return Err(invalid("browser.base_url", "must not be empty"));
        }
        Ok(())
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Database path: the configured one, or `rollcall.db` in the data directory.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.store.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("rollcall.db")),
        }
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/rollcall/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "rollcall", "rollcall").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/rollcall`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "rollcall", "rollcall").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Offset east of UTC, in minutes, for every timestamp written to the store
    pub utc_offset_minutes: i32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: crate::clock::DEFAULT_UTC_OFFSET_MINUTES,
        }
    }
}

/// Run pacing and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Maximum targets per run (0 = all pending)
    pub max_targets: usize,
    /// Targets between batch pauses (0 = never pause)
    pub batch_size: usize,
    /// Lower bound of the per-request delay, in seconds
    pub min_delay_secs: f64,
    /// Upper bound of the per-request delay, in seconds
    pub max_delay_secs: f64,
    /// Fixed pause at each batch boundary, in seconds
    pub batch_pause_secs: u64,
    /// Pause before loading the recent-post page, in milliseconds
    pub post_page_pause_ms: u64,
    /// What to do when a scraped nickname already has a profile row
    pub duplicate_policy: DuplicatePolicy,
}

/// Handling of a target whose nickname is already in the profile table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Append a fresh snapshot row and note changed fields on it
    #[default]
    Append,
    /// Leave the profile table alone and only note the original row
    Annotate,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_targets: 0,
            batch_size: 20,
            min_delay_secs: 0.3,
            max_delay_secs: 0.5,
            batch_pause_secs: 3,
            post_page_pause_ms: 1000,
            duplicate_policy: DuplicatePolicy::Append,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Timeout for the profile page to render, in seconds
    pub navigation_timeout_secs: u64,
    /// Timeout for the recent-post page to render, in seconds
    pub post_timeout_secs: u64,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub chrome_executable: Option<PathBuf>,
    /// Forum base URL
    pub base_url: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1366,
            window_height: 768,
            navigation_timeout_secs: 10,
            post_timeout_secs: 5,
            chrome_executable: None,
            base_url: "https://damadam.pk".to_string(),
        }
    }
}

/// Work-queue store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; defaults to `rollcall.db` in the data directory
    pub database_path: Option<PathBuf>,
    /// Attempts per store write before giving up
    pub write_attempts: u32,
    /// Fixed pause between write attempts, in seconds
    pub retry_backoff_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            write_attempts: 3,
            retry_backoff_secs: 60,
        }
    }
}

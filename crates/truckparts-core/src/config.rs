//! Configuration management for the TruckParts client.
//!
//! Loads configuration from ${TRUCKPARTS_HOME}/config.toml with sensible defaults.
//! `TRUCKPARTS_API_URL` and `TRUCKPARTS_API_TIMEOUT` override the file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Env var overriding `api_url`.
pub const API_URL_ENV: &str = "TRUCKPARTS_API_URL";
/// Env var overriding `timeout_secs`.
pub const API_TIMEOUT_ENV: &str = "TRUCKPARTS_API_TIMEOUT";

pub mod paths {
    //! Path resolution for TruckParts configuration and data directories.
    //!
    //! TRUCKPARTS_HOME resolution order:
    //! 1. TRUCKPARTS_HOME environment variable (if set)
    //! 2. ~/.config/truckparts (default)

    use std::path::PathBuf;

    /// Returns the TruckParts home directory.
    pub fn truckparts_home() -> PathBuf {
        if let Ok(home) = std::env::var("TRUCKPARTS_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".truckparts"),
            |h| h.join(".config").join("truckparts"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        truckparts_home().join("config.toml")
    }

    /// Returns the path to the local storage file (tokens + profile blob).
    pub fn storage_path() -> PathBuf {
        truckparts_home().join("storage.json")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend origin, without the API prefix
    pub api_url: String,

    /// Path prefix appended to `api_url` for every request
    pub api_prefix: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Delay before the post-logout redirect fires, in milliseconds
    pub redirect_delay_ms: u64,

    /// Login entry point used for hard redirects
    pub login_path: String,

    /// Routes under this path never trigger an automatic redirect
    pub profile_path: String,
}

impl Config {
    const DEFAULT_API_URL: &str = "http://localhost:8000";
    const DEFAULT_API_PREFIX: &str = "/arye_system";
    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_REDIRECT_DELAY_MS: u64 = 1000;

    /// Loads configuration from the default config path, then applies env overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_overrides(
            std::env::var(API_URL_ENV).ok().as_deref(),
            std::env::var(API_TIMEOUT_ENV).ok().as_deref(),
        )?;
        Ok(config)
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Applies override values (normally taken from the environment).
    ///
    /// Blank values are ignored. Precedence is env > config file > default.
    ///
    /// # Errors
    /// Returns an error if the URL is not absolute http(s) or the timeout is not a number.
    pub fn apply_overrides(&mut self, api_url: Option<&str>, timeout: Option<&str>) -> Result<()> {
        if let Some(url) = api_url.map(str::trim).filter(|v| !v.is_empty()) {
            validate_url(url)?;
            self.api_url = url.to_string();
        }

        if let Some(secs) = timeout.map(str::trim).filter(|v| !v.is_empty()) {
            self.timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid {API_TIMEOUT_ENV} value: {secs}"))?;
        }

        Ok(())
    }

    /// Base URL every request path is joined onto.
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        )
        .trim_end_matches('/')
        .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    ///
    /// # Errors
    /// Returns an error if the file exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        let contents =
            toml::to_string_pretty(&Config::default()).context("Failed to serialize config")?;
        Self::write_config(path, &contents)
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: Self::DEFAULT_API_URL.to_string(),
            api_prefix: Self::DEFAULT_API_PREFIX.to_string(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            redirect_delay_ms: Self::DEFAULT_REDIRECT_DELAY_MS,
            login_path: "/login".to_string(),
            profile_path: "/profile".to_string(),
        }
    }
}

fn validate_url(value: &str) -> Result<()> {
    let parsed =
        url::Url::parse(value).with_context(|| format!("Invalid {API_URL_ENV} value: {value}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{API_URL_ENV} must be an http(s) URL, got: {value}");
    }
    Ok(())
}

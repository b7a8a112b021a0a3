//! Configuration loading and persistence.
//!
//! Handles reading and writing the pushline configuration file and the
//! validated [`Credentials`] the state machine is configured with.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants;
use crate::error::PushError;

/// Configuration for a pushline host.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Backend base URL, including the API version path.
    pub base_url: String,
    /// Backend application id.
    pub app_id: String,
    /// Application API key.
    pub api_key: String,
    /// Bundle identifier reported in device metadata.
    pub bundle_id: String,
    /// Maximum number of notification records kept in history.
    pub history_capacity: usize,
    /// Seconds a dedup key suppresses redelivery.
    pub dedup_retention_secs: u64,
    /// Seconds between periodic statistics reports.
    pub report_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            app_id: String::new(),
            api_key: String::new(),
            bundle_id: "com.pushline.host".to_string(),
            history_capacity: constants::DEFAULT_HISTORY_CAPACITY,
            dedup_retention_secs: constants::DEFAULT_DEDUP_RETENTION.as_secs(),
            report_interval_secs: constants::DEFAULT_REPORT_INTERVAL.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/pushline-test`
    /// 2. `PUSHLINE_CONFIG_DIR` env var: explicit override
    /// 3. `PUSHLINE_ENV=test`: `tmp/pushline-test` (integration tests)
    /// 4. Default: platform config dir (macOS: ~/Library/Application Support/pushline)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/pushline-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(custom_dir) = std::env::var("PUSHLINE_CONFIG_DIR") {
                    PathBuf::from(custom_dir)
                } else if crate::env::is_test_mode() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/pushline-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("pushline")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            log::debug!("Using default config: {e:#}");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("PUSHLINE_BASE_URL") {
            self.base_url = base_url;
        }

        if let Ok(app_id) = std::env::var("PUSHLINE_APP_ID") {
            self.app_id = app_id;
        }

        // API key from env var (for CI/CD)
        if let Ok(api_key) = std::env::var("PUSHLINE_API_KEY") {
            self.api_key = api_key;
        }

        if let Ok(bundle_id) = std::env::var("PUSHLINE_BUNDLE_ID") {
            self.bundle_id = bundle_id;
        }

        if let Ok(capacity) = std::env::var("PUSHLINE_HISTORY_CAPACITY") {
            if let Ok(capacity) = capacity.parse::<usize>() {
                self.history_capacity = capacity;
            }
        }

        if let Ok(retention) = std::env::var("PUSHLINE_DEDUP_RETENTION_SECS") {
            if let Ok(secs) = retention.parse::<u64>() {
                self.dedup_retention_secs = secs;
            }
        }

        if let Ok(interval) = std::env::var("PUSHLINE_REPORT_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.report_interval_secs = secs;
            }
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // The file holds the API key: owner read/write only
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Validated backend credentials from this config.
    pub fn credentials(&self) -> Result<Credentials, PushError> {
        Credentials::new(&self.app_id, &self.api_key, &self.base_url)
    }

    /// History capacity, never zero.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity.max(1)
    }

    /// Dedup retention window, at least one second.
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs.max(1))
    }

    /// Periodic report interval, at least one second.
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }
}

/// Validated app id, API key and base URL.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    app_id: String,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Validate and normalize credentials.
    ///
    /// All three values must be non-blank and the base URL must use `http`
    /// or `https`. Surrounding whitespace and trailing slashes on the URL
    /// are removed.
    pub fn new(app_id: &str, api_key: &str, base_url: &str) -> Result<Self, PushError> {
        let app_id = app_id.trim();
        let api_key = api_key.trim();
        let base_url = base_url.trim().trim_end_matches('/');

        if app_id.is_empty() {
            return Err(PushError::Config("app id is empty".into()));
        }
        if api_key.is_empty() {
            return Err(PushError::Config("API key is empty".into()));
        }
        if base_url.is_empty() {
            return Err(PushError::Config("base URL is empty".into()));
        }
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(PushError::Config(format!(
                "base URL must start with http:// or https://, got {base_url}"
            )));
        }

        Ok(Self {
            app_id: app_id.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
        })
    }

    /// Backend application id.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Application API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for an app-scoped endpoint, e.g. `devices`.
    pub fn app_url(&self, endpoint: &str) -> String {
        format!(
            "{}/apps/{}/{}",
            self.base_url,
            self.app_id,
            endpoint.trim_start_matches('/')
        )
    }
}

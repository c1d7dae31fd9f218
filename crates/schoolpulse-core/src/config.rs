//! Application configuration management.
//!
//! Configuration is stored at `<config dir>/schoolpulse/config.json`. Missing
//! files and missing fields fall back to defaults, so an empty `{}` is a valid
//! configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::DEFAULT_API_BASE_URL;
use crate::cache::DEFAULT_CACHE_TIMEOUT_MS;
use crate::poller::{PollerConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_RETRIES};
use crate::store::{
    ContentStoreConfig, DEFAULT_FALLBACK_ENDPOINT, DEFAULT_MIN_DISPLAY_TIME_MS,
    DEFAULT_PRIMARY_ENDPOINT,
};

/// Application name used for the config directory path
const APP_NAME: &str = "schoolpulse";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "SCHOOLPULSE_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub primary_endpoint: String,
    pub fallback_endpoint: String,
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub cache_timeout_ms: u64,
    pub min_display_time_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Endpoints the `watch` command polls when none are given.
    pub watch_endpoints: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            primary_endpoint: DEFAULT_PRIMARY_ENDPOINT.to_string(),
            fallback_endpoint: DEFAULT_FALLBACK_ENDPOINT.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            cache_timeout_ms: DEFAULT_CACHE_TIMEOUT_MS,
            min_display_time_ms: DEFAULT_MIN_DISPLAY_TIME_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            watch_endpoints: vec![
                "/public/events".to_string(),
                "/public/notices".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            debug!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply overrides read through `lookup` (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.trim().is_empty()) {
            debug!(url = %url, "API base URL overridden from environment");
            self.api_base_url = url.trim().to_string();
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            default_interval: self.poll_interval(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn content_store_config(&self) -> ContentStoreConfig {
        ContentStoreConfig {
            primary_endpoint: self.primary_endpoint.clone(),
            fallback_endpoint: self.fallback_endpoint.clone(),
            cache_timeout: Duration::from_millis(self.cache_timeout_ms),
            min_display_time: Duration::from_millis(self.min_display_time_ms),
            retry: self.retry_policy(),
        }
    }
}

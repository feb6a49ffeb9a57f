//! Configuration management for the background host.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default handshake server (can be overridden at compile time via DOCBRIDGE_HANDSHAKE_URL).
pub const DEFAULT_HANDSHAKE_URL: &str = match option_env!("DOCBRIDGE_HANDSHAKE_URL") {
    Some(url) => url,
    None => "https://connect.docbridge.dev",
};

/// Default source-control provider (can be overridden at compile time via DOCBRIDGE_PROVIDER_URL).
pub const DEFAULT_PROVIDER_URL: &str = match option_env!("DOCBRIDGE_PROVIDER_URL") {
    Some(url) => url,
    None => "https://github.com",
};

/// Default GitHub App slug (can be overridden at compile time via DOCBRIDGE_APP_SLUG).
pub const DEFAULT_APP_SLUG: &str = match option_env!("DOCBRIDGE_APP_SLUG") {
    Some(slug) => slug,
    None => "docbridge",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default delay between handshake poll attempts.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_500;

/// Highest attempt index of the poll loop (attempts run 0..=60).
pub const DEFAULT_POLL_MAX_ATTEMPT: u32 = 60;

/// Background host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the handshake server (`/api/handshake/poll` lives here).
    #[serde(default = "default_handshake_url")]
    pub handshake_base_url: String,
    /// Base URL of the source-control provider that hosts the app install page.
    #[serde(default = "default_provider_url")]
    pub provider_base_url: String,
    /// Slug of the GitHub App to install.
    #[serde(default = "default_app_slug")]
    pub app_slug: String,
    /// Delay between poll attempts in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Highest poll attempt index.
    #[serde(default = "default_poll_max_attempt")]
    pub poll_max_attempt: u32,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_handshake_url() -> String {
    DEFAULT_HANDSHAKE_URL.to_string()
}

fn default_provider_url() -> String {
    DEFAULT_PROVIDER_URL.to_string()
}

fn default_app_slug() -> String {
    DEFAULT_APP_SLUG.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_max_attempt() -> u32 {
    DEFAULT_POLL_MAX_ATTEMPT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            handshake_base_url: default_handshake_url(),
            provider_base_url: default_provider_url(),
            app_slug: default_app_slug(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_max_attempt: DEFAULT_POLL_MAX_ATTEMPT,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `DOCBRIDGE_*` overrides from `lookup`.
    ///
    /// Empty values are ignored; an unparsable poll interval keeps the
    /// current value.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = get("DOCBRIDGE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = get("DOCBRIDGE_HANDSHAKE_URL") {
            self.handshake_base_url = url;
        }
        if let Some(slug) = get("DOCBRIDGE_APP_SLUG") {
            self.app_slug = slug;
        }
        if let Some(interval) = get("DOCBRIDGE_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = interval;
        }
    }

    /// Check that URLs parse and the app slug is usable.
    pub fn validate(&self) -> CoreResult<()> {
        self.handshake_url()?;
        self.provider_url()?;

        if self.app_slug.is_empty() || self.app_slug.contains('/') {
            return Err(CoreError::Config(format!(
                "Invalid app slug: {:?}",
                self.app_slug
            )));
        }

        Ok(())
    }

    /// Get the handshake server URL as a parsed URL.
    pub fn handshake_url(&self) -> CoreResult<Url> {
        Url::parse(&self.handshake_base_url).map_err(CoreError::from)
    }

    /// Get the provider URL as a parsed URL.
    pub fn provider_url(&self) -> CoreResult<Url> {
        Url::parse(&self.provider_base_url).map_err(CoreError::from)
    }

    /// Delay between poll attempts.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

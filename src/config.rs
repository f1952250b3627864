use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::client::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    pub obsidian: ObsidianConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 3,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ObsidianConfig {
    #[serde(default = "default_obsidian_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// The Local REST API plugin serves a self-signed certificate.
    #[serde(default)]
    pub verify_tls: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.weather.gov".to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_obsidian_url() -> String {
    "https://127.0.0.1:27124".to_string()
}

/// Problems that make a parsed configuration unusable.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("http.max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("http.timeout_ms must be greater than 0")]
    ZeroTimeout,
    #[error("obsidian.api_key is empty; set it in the config file or OBSIDIAN_API_KEY")]
    MissingApiKey,
    #[error("weather.user_agent is empty; the weather service rejects anonymous clients")]
    MissingUserAgent,
    #[error("{field} is not a valid URL: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context("Failed to read config file. Make sure config.toml exists.")?;

        let mut config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        config.apply_env_overrides(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Override secrets and identity from the environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OBSIDIAN_API_KEY") {
            self.obsidian.api_key = key;
        }
        if let Some(agent) = lookup("WEATHER_USER_AGENT") {
            self.weather.user_agent = agent;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.http.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.obsidian.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.weather.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingUserAgent);
        }
        self.obsidian_url()?;
        self.weather_url()?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http.max_attempts,
            Duration::from_millis(self.http.base_delay_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.http.timeout_ms)
    }

    pub fn obsidian_url(&self) -> Result<Url, ConfigError> {
        parse_url("obsidian.base_url", &self.obsidian.base_url)
    }

    pub fn weather_url(&self) -> Result<Url, ConfigError> {
        parse_url("weather.base_url", &self.weather.base_url)
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: "URL cannot be used as a base".to_string(),
        });
    }
    Ok(url)
}

use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Proxy service endpoint for stateless HTTP fetches.
    pub proxy_url: String,
    /// Bounded wait for an expected DOM element, in seconds.
    pub element_timeout_seconds: u64,
    /// Settle delay after a pagination click, in milliseconds.
    pub settle_ms: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts for a whole-source pagination run.
    pub source_max_attempts: u32,
    pub source_delay_seconds: u64,
    /// Total attempts for a per-row detail fetch.
    pub detail_max_attempts: u32,
    pub detail_delay_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Only records crawled within this many days are served by the read API.
    pub recent_window_days: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            proxy_url: "https://proxy.scrapeops.io/v1/".to_string(),
            element_timeout_seconds: 10,
            settle_ms: 2000,
            request_timeout_seconds: 30,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            source_max_attempts: 2,
            source_delay_seconds: 10,
            detail_max_attempts: 2,
            detail_delay_seconds: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "auction_data.db".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_string(),
            recent_window_days: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{config_path}': {e}"))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Loads `config.toml` if present, otherwise runs with stock settings.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                Config::default()
            }
        }
    }
}

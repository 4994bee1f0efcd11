//! Engine configuration.
//!
//! All fields are required. No defaults.
//!
//! ```toml
//! api_base_url = "https://api.example"
//!
//! [cache]
//! path = "/var/cache/roster"
//! max_size_mb = 64
//!
//! [retry]
//! budget = 2
//! initial_backoff_ms = 250
//! max_backoff_ms = 4000
//! multiplier = 2.0
//! jitter_ms = 50
//!
//! [channel]
//! queue_capacity = 64
//!
//! [log]
//! filter = "roster_pipeline=debug,info"
//! json = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use roster_core::{CacheKey, FETCH_REQUEST_TIMEOUT};
use roster_fetch::RetryPolicy;
use serde::Deserialize;

use crate::channel::ChannelConfig;

const CONFIG_ENV: &str = "ROSTER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub api_base_url: String,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub channel: ChannelSection,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub max_size_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt. 0 disables retry.
    pub budget: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or ROSTER_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if let Err(err) = CacheKey::parse(&self.api_base_url) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: err.to_string(),
            });
        }
        if self.cache.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache.path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cache.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.max_size_mb",
                reason: "must be > 0".to_string(),
            });
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_backoff_ms",
                reason: "must be >= initial_backoff_ms".to_string(),
            });
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.multiplier",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if self.channel.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "channel.queue_capacity",
                reason: "must be > 0".to_string(),
            });
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
            self.retry.multiplier,
        )
        .with_jitter(Duration::from_millis(self.retry.jitter_ms))
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            queue_capacity: self.channel.queue_capacity,
            request_timeout: FETCH_REQUEST_TIMEOUT,
            default_retry_budget: self.retry.budget,
        }
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

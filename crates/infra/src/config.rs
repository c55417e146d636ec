//! Configuration loading and representation.
//!
//! Defaults are usable as-is; `COA_*` environment variables override them.

use core::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use coa_observability::LogFormat;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime knobs for the chart-of-accounts services and the outbox relay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccountingConfig {
    /// Bus publication attempts per event before the relay gives up on it.
    pub publish_max_attempts: u32,
    /// Pause between publication attempts.
    pub publish_retry_backoff_ms: u64,
    /// How often the relay wakes up to check for shutdown when idle.
    pub relay_poll_interval_ms: u64,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub log_format: LogFormat,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            publish_max_attempts: 3,
            publish_retry_backoff_ms: 50,
            relay_poll_interval_ms: 250,
            default_page_size: 20,
            max_page_size: 100,
            log_format: LogFormat::Json,
        }
    }
}

impl AccountingConfig {
    /// Defaults overlaid with `COA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `COA_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        overlay(&lookup, "COA_PUBLISH_MAX_ATTEMPTS", &mut config.publish_max_attempts)?;
        overlay(&lookup, "COA_PUBLISH_RETRY_BACKOFF_MS", &mut config.publish_retry_backoff_ms)?;
        overlay(&lookup, "COA_RELAY_POLL_INTERVAL_MS", &mut config.relay_poll_interval_ms)?;
        overlay(&lookup, "COA_DEFAULT_PAGE_SIZE", &mut config.default_page_size)?;
        overlay(&lookup, "COA_MAX_PAGE_SIZE", &mut config.max_page_size)?;
        overlay(&lookup, "COA_LOG_FORMAT", &mut config.log_format)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish_max_attempts == 0 {
            return Err(ConfigError::Inconsistent(
                "publish_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(ConfigError::Inconsistent("page sizes must be at least 1".to_string()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Inconsistent(format!(
                "default_page_size ({}) exceeds max_page_size ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }

    pub fn publish_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_retry_backoff_ms)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_interval_ms)
    }
}

fn overlay<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })?;
    }
    Ok(())
}

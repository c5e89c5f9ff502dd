use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::RetryConfig;
use crate::types::Role;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub bind_addr: String,
    pub difficulty_bits: u32,
    pub recent_log_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            difficulty_bits: 18,
            recent_log_limit: 32,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = CoordinatorConfig::default();

        if let Ok(val) = env::var("BIND_ADDR") {
            config.bind_addr = val;
        }

        if let Ok(val) = env::var("DIFFICULTY_BITS") {
            config.difficulty_bits = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("DIFFICULTY_BITS".to_string(), val))?;
        }

        if let Ok(val) = env::var("RECENT_LOG_LIMIT") {
            config.recent_log_limit = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("RECENT_LOG_LIMIT".to_string(), val))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.is_empty() {
            return Err(ConfigError::ValidationError("BIND_ADDR must not be empty".to_string()));
        }

        if self.difficulty_bits == 0 || self.difficulty_bits > 64 {
            return Err(ConfigError::ValidationError(
                "DIFFICULTY_BITS must be between 1 and 64".to_string(),
            ));
        }

        if self.recent_log_limit == 0 {
            return Err(ConfigError::ValidationError(
                "RECENT_LOG_LIMIT must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub coordinator_url: String,
    pub miner_id: String,
    pub role: Role,

    // Search tuning
    pub batch_size: u64,
    pub refresh_interval: u64,

    // Error handling and recovery
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    // Monitoring and logging
    pub stats_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://127.0.0.1:8000".to_string(),
            miner_id: "cpu-miner-1".to_string(),
            role: Role::Sequential,

            batch_size: 100_000,
            refresh_interval: 0,

            max_retries: 3,
            retry_delay_ms: 1000,

            stats_interval_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = WorkerConfig::default();

        if let Ok(val) = env::var("COORDINATOR_URL") {
            config.coordinator_url = val;
        }

        if let Ok(val) = env::var("MINER_ID") {
            config.miner_id = val;
        }

        if let Ok(val) = env::var("MINER_ROLE") {
            config.role = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("MINER_ROLE".to_string(), val))?;
        }

        if let Ok(val) = env::var("BATCH_SIZE") {
            config.batch_size = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("BATCH_SIZE".to_string(), val))?;
        }

        if let Ok(val) = env::var("REFRESH_INTERVAL") {
            config.refresh_interval = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("REFRESH_INTERVAL".to_string(), val))?;
        }

        if let Ok(val) = env::var("MAX_RETRIES") {
            config.max_retries = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("MAX_RETRIES".to_string(), val))?;
        }

        if let Ok(val) = env::var("RETRY_DELAY_MS") {
            config.retry_delay_ms = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("RETRY_DELAY_MS".to_string(), val))?;
        }

        if let Ok(val) = env::var("STATS_INTERVAL_SECS") {
            config.stats_interval_secs = val
                .parse()
                .map_err(|_| ConfigError::InvalidEnvVar("STATS_INTERVAL_SECS".to_string(), val))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.coordinator_url.starts_with("http") {
            return Err(ConfigError::ValidationError(
                "COORDINATOR_URL must be a valid HTTP URL".to_string(),
            ));
        }

        if self.miner_id.is_empty() || self.miner_id.len() > 64 {
            return Err(ConfigError::ValidationError(
                "MINER_ID must be 1..=64 characters".to_string(),
            ));
        }

        if self.role == Role::Batch && self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "BATCH_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..RetryConfig::default()
        }
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

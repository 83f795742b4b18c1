//! Host bridge configuration with validation.

use serde::{Deserialize, Serialize};
use shared_protocol::humantime_serde;
use std::time::Duration;

/// Host-side limits applied to every binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Max calls accepted in one batch frame
    pub max_batch_size: usize,
    /// Max handler invocations running at once per binding
    pub max_concurrent_calls: usize,
    /// Deadline for a single handler invocation (None = rely on the caller's deadline)
    #[serde(with = "humantime_serde::option")]
    pub handler_timeout: Option<Duration>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 256,
            max_concurrent_calls: 256,
            handler_timeout: None,
        }
    }
}

impl HostConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_batch_size cannot be 0".into(),
            ));
        }

        if self.max_concurrent_calls == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_concurrent_calls cannot be 0".into(),
            ));
        }

        if self.handler_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidTimeout(
                "handler_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

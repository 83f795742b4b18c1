//! Sandbox runtime configuration with validation.

use serde::{Deserialize, Serialize};
use shared_protocol::humantime_serde;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for one sandbox binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Deadlines and outstanding-call limits
    pub calls: CallConfig,
    /// Result cache
    pub cache: CacheConfig,
    /// Batch window
    pub batch: BatchConfig,
}

impl SandboxConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calls.validate()?;
        self.cache.validate()?;
        self.batch.validate()
    }
}

/// Call deadlines and backpressure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Deadline applied when a call does not set its own
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Ceiling on outstanding calls per binding
    pub max_outstanding: usize,
    /// How often abandoned pending calls are swept
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_outstanding: 1024,
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

impl CallConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default_timeout cannot be 0".into(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "cleanup_interval cannot be 0".into(),
            ));
        }
        if self.max_outstanding == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_outstanding cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// TTL when neither the call nor its namespace sets one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Per-namespace TTL overrides
    #[serde(with = "humantime_serde::map")]
    pub namespace_ttl: HashMap<String, Duration>,
    /// Calls that are never cached or coalesced: `"ns.proc"` or `"ns.*"`
    pub non_cacheable: Vec<String>,
    /// Upper bound on stored entries
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(5),
            namespace_ttl: HashMap::new(),
            non_cacheable: Vec::new(),
            max_entries: 4096,
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::InvalidLimit("max_entries cannot be 0".into()));
        }
        for pattern in &self.non_cacheable {
            match pattern.split_once('.') {
                Some((ns, proc_)) if !ns.is_empty() && !proc_.is_empty() && !proc_.contains('.') => {}
                _ => return Err(ConfigError::InvalidPattern(pattern.clone())),
            }
        }
        Ok(())
    }

    /// Whether results of `namespace.procedure` may be cached.
    pub fn is_cacheable(&self, namespace: &str, procedure: &str) -> bool {
        self.enabled
            && !self.non_cacheable.iter().any(|pattern| {
                pattern.split_once('.').is_some_and(|(ns, proc_)| {
                    ns == namespace && (proc_ == "*" || proc_ == procedure)
                })
            })
    }

    /// Call override, then namespace default, then global default.
    pub fn ttl_for(&self, namespace: &str, call_override: Option<Duration>) -> Duration {
        call_override
            .or_else(|| self.namespace_ttl.get(namespace).copied())
            .unwrap_or(self.default_ttl)
    }
}

/// Batch window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub enabled: bool,
    /// How long a window stays open after its first call
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Window is flushed early once it holds this many calls
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_millis(2),
            max_batch_size: 64,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_batch_size cannot be 0".into(),
            ));
        }
        if self.enabled && self.window.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "batch window cannot be 0 while batching is enabled".into(),
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
    /// Unparseable `non_cacheable` entry
    #[error("invalid non-cacheable pattern '{0}', expected \"ns.proc\" or \"ns.*\"")]
    InvalidPattern(String),
}

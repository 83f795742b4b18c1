//! Per-call options.

use std::time::Duration;

/// Overrides applied to a single call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Cache TTL for this call's result
    pub ttl: Option<Duration>,
    /// Skip the cache in both directions and never coalesce
    pub bypass_cache: bool,
    /// Send immediately instead of waiting for the batch window
    pub urgent: bool,
    /// Deadline for this call
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }
}

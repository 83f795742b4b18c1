//! Host bridge counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HostMetrics {
    calls_received: AtomicU64,
    calls_dispatched: AtomicU64,
    calls_succeeded: AtomicU64,
    handler_errors: AtomicU64,
    handler_timeouts: AtomicU64,
    not_found: AtomicU64,
    malformed: AtomicU64,
    origin_rejected: AtomicU64,
    batches_received: AtomicU64,
    total_handler_ms: AtomicU64,
}

/// Point-in-time copy of [`HostMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostMetricsSnapshot {
    pub calls_received: u64,
    pub calls_dispatched: u64,
    pub calls_succeeded: u64,
    pub handler_errors: u64,
    pub handler_timeouts: u64,
    pub not_found: u64,
    pub malformed: u64,
    pub origin_rejected: u64,
    pub batches_received: u64,
    pub total_handler_ms: u64,
}

impl HostMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call_received(&self) {
        self.calls_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A handler was found and invoked.
    pub fn record_dispatched(&self) {
        self.calls_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, handler_ms: u64) {
        self.calls_succeeded.fetch_add(1, Ordering::Relaxed);
        self.total_handler_ms.fetch_add(handler_ms, Ordering::Relaxed);
    }

    pub fn record_handler_error(&self, handler_ms: u64) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
        self.total_handler_ms.fetch_add(handler_ms, Ordering::Relaxed);
    }

    pub fn record_handler_timeout(&self) {
        self.handler_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_origin_rejected(&self) {
        self.origin_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HostMetricsSnapshot {
        HostMetricsSnapshot {
            calls_received: self.calls_received.load(Ordering::Relaxed),
            calls_dispatched: self.calls_dispatched.load(Ordering::Relaxed),
            calls_succeeded: self.calls_succeeded.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            handler_timeouts: self.handler_timeouts.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            origin_rejected: self.origin_rejected.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            total_handler_ms: self.total_handler_ms.load(Ordering::Relaxed),
        }
    }
}

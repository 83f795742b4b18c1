//! Call result cache.
//!
//! Memoizes successful results by [`CallSignature`] for a TTL and coalesces
//! concurrent identical calls into a single underlying call. Failures are
//! handed to every waiting caller but never stored.
//!
//! Expired entries are treated as absent and purged lazily, on lookup or
//! when the entry bound is reached.

use crate::domain::{CacheConfig, CallOptions, CallSignature};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use shared_protocol::BridgeResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

type InFlight = Shared<BoxFuture<'static, BridgeResult<Value>>>;

/// What to drop from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Signature(CallSignature),
    Namespace(String),
    All,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped for expiry or to respect `max_entries`
    pub evictions: u64,
    /// Callers that joined an identical call already in flight
    pub coalesced: u64,
    /// Entries dropped by explicit invalidation
    pub invalidations: u64,
    /// Entries currently stored, fresh or not
    pub entries: usize,
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CallSignature, CacheEntry>,
    /// Keyed fetches in progress, tagged so a fetch only settles its own slot.
    in_flight: HashMap<CallSignature, (u64, InFlight)>,
    next_fetch: u64,
    stats: CacheStats,
}

impl CacheState {
    fn lookup(&mut self, signature: &CallSignature) -> Option<Value> {
        let now = Instant::now();
        match self.entries.get(signature) {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(signature);
                self.stats.evictions += 1;
                None
            }
            None => None,
        }
    }

    fn store(&mut self, signature: CallSignature, value: Value, ttl: Duration, max_entries: usize) {
        if ttl.is_zero() {
            return;
        }
        if !self.entries.contains_key(&signature) && self.entries.len() >= max_entries {
            self.make_room(max_entries);
        }
        self.entries.insert(
            signature,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    fn make_room(&mut self, max_entries: usize) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        self.stats.evictions += (before - self.entries.len()) as u64;

        while self.entries.len() >= max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(signature, _)| signature.clone());
            match oldest {
                Some(signature) => {
                    trace!(signature = %signature, "Evicting oldest cache entry");
                    self.entries.remove(&signature);
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
    }
}

/// Per-binding result cache. Clones share state.
#[derive(Clone)]
pub struct CallCache {
    config: Arc<CacheConfig>,
    state: Arc<Mutex<CacheState>>,
}

impl CallCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether a call may go through the cache at all.
    pub fn admits(&self, namespace: &str, procedure: &str, options: &CallOptions) -> bool {
        !options.bypass_cache && self.config.is_cacheable(namespace, procedure)
    }

    /// TTL for a call in `namespace` with an optional per-call override.
    pub fn ttl_for(&self, namespace: &str, call_override: Option<Duration>) -> Duration {
        self.config.ttl_for(namespace, call_override)
    }

    /// Fresh value for `signature`, if any.
    pub fn get(&self, signature: &CallSignature) -> Option<Value> {
        let mut state = self.state.lock();
        let found = state.lookup(signature);
        if found.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        found
    }

    pub fn put(&self, signature: CallSignature, value: Value, ttl: Duration) {
        let max_entries = self.config.max_entries;
        self.state.lock().store(signature, value, ttl, max_entries);
    }

    /// Drop matching entries and forget matching in-flight calls. Returns entries dropped.
    pub fn invalidate(&self, scope: Invalidation) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        match &scope {
            Invalidation::Signature(signature) => {
                state.entries.remove(signature);
                state.in_flight.remove(signature);
            }
            Invalidation::Namespace(namespace) => {
                state.entries.retain(|sig, _| sig.namespace != *namespace);
                state.in_flight.retain(|sig, _| sig.namespace != *namespace);
            }
            Invalidation::All => {
                state.entries.clear();
                state.in_flight.clear();
            }
        }
        let dropped = before - state.entries.len();
        state.stats.invalidations += dropped as u64;
        debug!(scope = ?scope, dropped, "Invalidated cache entries");
        dropped
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }

    /// Number of distinct calls currently being fetched.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Return a fresh cached value, join an identical call in flight, or run
    /// `fetch` and store its result on success.
    pub async fn get_or_fetch<F>(
        &self,
        signature: CallSignature,
        ttl: Duration,
        fetch: F,
    ) -> BridgeResult<Value>
    where
        F: Future<Output = BridgeResult<Value>> + Send + 'static,
    {
        let shared = {
            let mut state = self.state.lock();
            if let Some(value) = state.lookup(&signature) {
                state.stats.hits += 1;
                trace!(signature = %signature, "Cache hit");
                return Ok(value);
            }
            if let Some((_, existing)) = state.in_flight.get(&signature) {
                let joined = existing.clone();
                state.stats.coalesced += 1;
                debug!(signature = %signature, "Joining in-flight call");
                joined
            } else {
                state.stats.misses += 1;
                state.next_fetch += 1;
                let token = state.next_fetch;
                let fetched = self
                    .clone()
                    .fetch_and_store(signature.clone(), ttl, token, fetch)
                    .boxed()
                    .shared();
                state.in_flight.insert(signature, (token, fetched.clone()));
                fetched
            }
        };
        shared.await
    }

    async fn fetch_and_store<F>(
        self,
        signature: CallSignature,
        ttl: Duration,
        token: u64,
        fetch: F,
    ) -> BridgeResult<Value>
    where
        F: Future<Output = BridgeResult<Value>> + Send + 'static,
    {
        let result = fetch.await;
        let max_entries = self.config.max_entries;
        let mut state = self.state.lock();
        // An invalidation while in flight removed our slot; the result is stale.
        let still_current = state
            .in_flight
            .get(&signature)
            .is_some_and(|(current, _)| *current == token);
        if still_current {
            state.in_flight.remove(&signature);
            if let Ok(value) = &result {
                state.store(signature, value.clone(), ttl, max_entries);
            }
        }
        result
    }
}

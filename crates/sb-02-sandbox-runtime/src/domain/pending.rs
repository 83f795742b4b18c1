//! Pending call table: correlates outbound calls with their results.
//!
//! Flow:
//! 1. The proxy builds a `CallEnvelope`
//! 2. `register()` stores a `PendingCall` and hands back a oneshot receiver
//! 3. The envelope crosses the boundary
//! 4. The response listener calls `resolve()` with the matching `ResultEnvelope`
//! 5. The caller awaits the receiver or gives up at its deadline (`discard()`)
//!
//! Every entry leaves the table exactly once: resolved, failed, discarded,
//! cancelled or swept. Results for ids no longer in the table are ignored.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use shared_protocol::{BridgeError, BridgeResult, CallEnvelope, CallId, ResultEnvelope};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Receiver side of a registered call.
pub type CallReceiver = oneshot::Receiver<BridgeResult<Value>>;

/// An outstanding call waiting for its result
struct PendingCall {
    namespace: String,
    procedure: String,
    created_at: Instant,
    timeout_at: Instant,
    sender: oneshot::Sender<BridgeResult<Value>>,
}

impl PendingCall {
    fn complete(self, result: BridgeResult<Value>) -> bool {
        self.sender.send(result).is_ok()
    }
}

#[derive(Debug, Default)]
struct PendingStats {
    registered: AtomicU64,
    resolved: AtomicU64,
    failed: AtomicU64,
    timeouts: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    late_results: AtomicU64,
}

/// Point-in-time counters for a [`PendingCallTable`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingStatsSnapshot {
    pub registered: u64,
    pub resolved: u64,
    pub failed: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    /// Refused at `register()` because the table was full
    pub rejected: u64,
    /// Results that arrived for unknown or already settled ids
    pub late_results: u64,
    pub outstanding: usize,
}

pub struct PendingCallTable {
    calls: Mutex<HashMap<CallId, PendingCall>>,
    /// Written and read only while `calls` is locked.
    closed: AtomicBool,
    max_outstanding: usize,
    stats: PendingStats,
}

impl PendingCallTable {
    pub fn new(max_outstanding: usize) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            max_outstanding,
            stats: PendingStats::default(),
        }
    }

    /// Track `call` until its result arrives or `timeout` passes.
    pub fn register(&self, call: &CallEnvelope, timeout: Duration) -> BridgeResult<CallReceiver> {
        let mut calls = self.calls.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::cancelled("binding closed"));
        }
        if calls.len() >= self.max_outstanding {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                call_id = %call.id,
                outstanding = calls.len(),
                "Outstanding call limit reached"
            );
            return Err(BridgeError::too_many_outstanding(self.max_outstanding));
        }
        if calls.contains_key(&call.id) {
            return Err(BridgeError::malformed(format!(
                "call id {} is already outstanding",
                call.id
            )));
        }

        let (tx, rx) = oneshot::channel();
        let now = Instant::now();
        calls.insert(
            call.id.clone(),
            PendingCall {
                namespace: call.namespace.clone(),
                procedure: call.procedure.clone(),
                created_at: now,
                timeout_at: now + timeout,
                sender: tx,
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            call_id = %call.id,
            namespace = %call.namespace,
            procedure = %call.procedure,
            "Registered pending call"
        );
        Ok(rx)
    }

    /// Settle the call a result belongs to. Returns false for late or unknown ids.
    pub fn resolve(&self, result: ResultEnvelope) -> bool {
        let Some(pending) = self.calls.lock().remove(&result.id) else {
            self.stats.late_results.fetch_add(1, Ordering::Relaxed);
            debug!(call_id = %result.id, "Ignoring result for unknown or expired call");
            return false;
        };

        let elapsed_ms = pending.created_at.elapsed().as_millis() as u64;
        debug!(
            call_id = %result.id,
            namespace = %pending.namespace,
            procedure = %pending.procedure,
            elapsed_ms,
            ok = result.outcome.is_success(),
            "Resolved pending call"
        );
        self.stats.resolved.fetch_add(1, Ordering::Relaxed);
        pending.complete(result.into_result())
    }

    /// Fail one call with a local error (send failure, malformed reply).
    pub fn fail(&self, id: &CallId, error: BridgeError) -> bool {
        let Some(pending) = self.calls.lock().remove(id) else {
            return false;
        };
        debug!(call_id = %id, error = %error, "Failing pending call");
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
        pending.complete(Err(error))
    }

    /// Drop a call whose caller stopped waiting at its deadline.
    pub fn discard(&self, id: &CallId) -> bool {
        if self.calls.lock().remove(id).is_some() {
            self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Refuse further registrations and fail every outstanding call with
    /// `cancelled`.
    ///
    /// Returns how many calls were cancelled, or `None` if the table was
    /// already closed.
    pub fn close(&self, reason: &str) -> Option<usize> {
        let drained: Vec<(CallId, PendingCall)> = {
            let mut calls = self.calls.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return None;
            }
            calls.drain().collect()
        };
        Some(self.settle_cancelled(drained, reason))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fail the outstanding calls of the given namespaces with `cancelled`.
    pub fn cancel_namespaces(&self, namespaces: &[&str], reason: &str) -> usize {
        let drained: Vec<(CallId, PendingCall)> = {
            let mut calls = self.calls.lock();
            let ids: Vec<CallId> = calls
                .iter()
                .filter(|(_, pending)| namespaces.contains(&pending.namespace.as_str()))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| calls.remove(&id).map(|pending| (id, pending)))
                .collect()
        };
        self.settle_cancelled(drained, reason)
    }

    /// Fail every outstanding call with `error`. Used when the transport dies.
    pub fn fail_all(&self, error: &BridgeError) -> usize {
        let drained: Vec<(CallId, PendingCall)> = self.calls.lock().drain().collect();
        let count = drained.len();
        for (_, pending) in drained {
            pending.complete(Err(error.clone()));
        }
        self.stats.failed.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    fn settle_cancelled(&self, drained: Vec<(CallId, PendingCall)>, reason: &str) -> usize {
        let count = drained.len();
        for (id, pending) in drained {
            debug!(call_id = %id, namespace = %pending.namespace, "Cancelling pending call");
            pending.complete(Err(BridgeError::cancelled(reason)));
        }
        self.stats.cancelled.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Fail calls whose deadline passed with `timeout`.
    ///
    /// Callers normally discard their own entry at the deadline; this catches
    /// callers that were dropped before they could.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(CallId, PendingCall)> = {
            let mut calls = self.calls.lock();
            let ids: Vec<CallId> = calls
                .iter()
                .filter(|(_, pending)| pending.timeout_at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| calls.remove(&id).map(|pending| (id, pending)))
                .collect()
        };

        let count = expired.len();
        for (id, pending) in expired {
            let waited = now.duration_since(pending.created_at);
            warn!(
                call_id = %id,
                namespace = %pending.namespace,
                procedure = %pending.procedure,
                elapsed_ms = waited.as_millis() as u64,
                "Removing expired pending call"
            );
            pending.complete(Err(BridgeError::timeout(waited)));
        }
        self.stats.timeouts.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn pending_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_pending(&self, id: &CallId) -> bool {
        self.calls.lock().contains_key(id)
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub fn stats(&self) -> PendingStatsSnapshot {
        PendingStatsSnapshot {
            registered: self.stats.registered.load(Ordering::Relaxed),
            resolved: self.stats.resolved.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            cancelled: self.stats.cancelled.load(Ordering::Relaxed),
            rejected: self.stats.rejected.load(Ordering::Relaxed),
            late_results: self.stats.late_results.load(Ordering::Relaxed),
            outstanding: self.pending_count(),
        }
    }
}

/// Background sweep of expired calls. Ends once the table is dropped.
pub async fn cleanup_task(table: Weak<PendingCallTable>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(table) = table.upgrade() else {
            break;
        };
        let removed = table.remove_expired();
        if removed > 0 {
            debug!(removed, "Swept expired pending calls");
        }
    }
}

/// Spawn [`cleanup_task`] for `table`.
pub fn spawn_cleanup(table: &Arc<PendingCallTable>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(cleanup_task(Arc::downgrade(table), interval))
}

//! Batch scheduler.
//!
//! Calls submitted while a window is open are held and leave together as one
//! `batch` frame when the window closes or fills up. A window holding a single
//! call sends it as a plain `call`. Urgent calls, and every call when batching
//! is disabled, are sent immediately.
//!
//! ```text
//! submit ──► [window open] ──(window elapsed | max_batch_size)──► flush ──► transport
//!    └── urgent ───────────────────────────────────────────────────────────► transport
//! ```
//!
//! The scheduler never resolves calls itself. A failed send fails the
//! affected pending calls with `transport-closed`; everything else is settled
//! by the response listener. Calls settled while queued (cancelled, timed
//! out) are dropped at send time and never reach the wire.

use crate::domain::{BatchConfig, PendingCallTable};
use parking_lot::Mutex;
use serde::Serialize;
use shared_channel::Transport;
use shared_protocol::{BridgeError, CallEnvelope, ErrorKind, Message};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Frames carrying more than one call
    pub batches_sent: u64,
    /// Calls that left inside a window (batched or alone)
    pub windowed_calls: u64,
    /// Calls sent without waiting for a window
    pub immediate_sends: u64,
    /// Frames the transport refused
    pub send_failures: u64,
}

#[derive(Default)]
struct Counters {
    batches_sent: AtomicU64,
    windowed_calls: AtomicU64,
    immediate_sends: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Default)]
struct Window {
    /// Identifies the open window; bumped on every flush.
    generation: u64,
    calls: Vec<CallEnvelope>,
}

impl Window {
    fn take(&mut self) -> Vec<CallEnvelope> {
        self.generation += 1;
        mem::take(&mut self.calls)
    }
}

struct Inner {
    config: BatchConfig,
    transport: Arc<dyn Transport>,
    pending: Arc<PendingCallTable>,
    window: Mutex<Window>,
    counters: Counters,
}

/// Per-binding batch scheduler. Clones share the window.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
}

impl BatchScheduler {
    pub fn new(
        config: BatchConfig,
        transport: Arc<dyn Transport>,
        pending: Arc<PendingCallTable>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                pending,
                window: Mutex::new(Window::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Queue `call` for sending. Its pending entry must already be registered.
    pub async fn submit(&self, call: CallEnvelope, urgent: bool) {
        if urgent || !self.inner.config.enabled {
            self.inner.counters.immediate_sends.fetch_add(1, Ordering::Relaxed);
            trace!(call_id = %call.id, "Sending call immediately");
            self.send(vec![call]).await;
            return;
        }

        let full = {
            let mut window = self.inner.window.lock();
            window.calls.push(call);
            if window.calls.len() == 1 {
                self.arm_timer(window.generation);
            }
            if window.calls.len() >= self.inner.config.max_batch_size {
                Some(window.take())
            } else {
                None
            }
        };

        if let Some(calls) = full {
            debug!(size = calls.len(), "Batch window full, flushing early");
            self.send_window(calls).await;
        }
    }

    /// Send whatever the open window holds right now.
    pub async fn flush(&self) {
        let calls = self.inner.window.lock().take();
        self.send_window(calls).await;
    }

    /// Drop every call waiting in the open window without sending it.
    ///
    /// The window's timer is disarmed. Returns how many calls were dropped.
    pub fn discard_queued(&self) -> usize {
        let dropped = self.inner.window.lock().take();
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "Discarded queued calls");
        }
        dropped.len()
    }

    /// Calls waiting in the open window.
    pub fn queued(&self) -> usize {
        self.inner.window.lock().calls.len()
    }

    pub fn stats(&self) -> BatchStats {
        let counters = &self.inner.counters;
        BatchStats {
            batches_sent: counters.batches_sent.load(Ordering::Relaxed),
            windowed_calls: counters.windowed_calls.load(Ordering::Relaxed),
            immediate_sends: counters.immediate_sends.load(Ordering::Relaxed),
            send_failures: counters.send_failures.load(Ordering::Relaxed),
        }
    }

    fn arm_timer(&self, generation: u64) {
        let scheduler = self.clone();
        let window = self.inner.config.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            scheduler.flush_generation(generation).await;
        });
    }

    async fn flush_generation(&self, generation: u64) {
        let calls = {
            let mut window = self.inner.window.lock();
            if window.generation != generation {
                return;
            }
            window.take()
        };
        self.send_window(calls).await;
    }

    async fn send_window(&self, calls: Vec<CallEnvelope>) {
        if calls.is_empty() {
            return;
        }
        let sent = self.send(calls).await;
        self.inner
            .counters
            .windowed_calls
            .fetch_add(sent as u64, Ordering::Relaxed);
    }

    /// Put the still-pending `calls` on the wire. Returns how many were sent.
    async fn send(&self, calls: Vec<CallEnvelope>) -> usize {
        let queued = calls.len();
        let mut calls: Vec<CallEnvelope> = calls
            .into_iter()
            .filter(|call| self.inner.pending.is_pending(&call.id))
            .collect();
        if calls.len() < queued {
            debug!(
                dropped = queued - calls.len(),
                "Dropping calls settled before they were sent"
            );
        }

        let message = if calls.len() == 1 {
            match calls.pop() {
                Some(call) => Message::Call(call),
                None => return 0,
            }
        } else if calls.is_empty() {
            return 0;
        } else {
            self.inner.counters.batches_sent.fetch_add(1, Ordering::Relaxed);
            Message::batch(calls.into_iter().map(Message::Call).collect())
        };

        let ids = match &message {
            Message::Call(call) => vec![call.id.clone()],
            Message::Batch { messages, .. } => messages.iter().map(|m| m.id().clone()).collect(),
            Message::Result(_) => Vec::new(),
        };

        let sent = match message.encode() {
            Ok(payload) => self
                .inner
                .transport
                .send(payload)
                .await
                .map_err(BridgeError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = sent {
            self.inner.counters.send_failures.fetch_add(1, Ordering::Relaxed);
            warn!(calls = ids.len(), error = %e, "Failed to send calls");
            let error = if e.kind == ErrorKind::TransportClosed {
                e
            } else {
                BridgeError::transport_closed(e.message)
            };
            for id in &ids {
                self.inner.pending.fail(id, error.clone());
            }
        } else {
            trace!(frame = message.kind_name(), calls = ids.len(), "Sent frame");
        }
        ids.len()
    }
}

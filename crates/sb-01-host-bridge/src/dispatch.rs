//! Call dispatch.
//!
//! Turns one validated `CallEnvelope` into exactly one `ResultEnvelope`.
//! Lookup misses, handler errors, panics and handler deadlines all become
//! failure outcomes; nothing escapes to the binding loop.

use crate::domain::{HostMetrics, ProcedureRegistry};
use crate::ports::HandlerError;
use futures::FutureExt;
use serde_json::Value;
use shared_protocol::{BridgeError, BridgeResult, CallEnvelope, ResultEnvelope};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Per-binding dispatcher. Cheap to clone; clones share the concurrency limit.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ProcedureRegistry>,
    metrics: Arc<HostMetrics>,
    handler_timeout: Option<Duration>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ProcedureRegistry>,
        metrics: Arc<HostMetrics>,
        handler_timeout: Option<Duration>,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            registry,
            metrics,
            handler_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent_calls)),
        }
    }

    /// Resolve one call. Always returns a result carrying the call's id.
    pub async fn dispatch(&self, call: CallEnvelope) -> ResultEnvelope {
        self.metrics.record_call_received();
        let id = call.id.clone();
        match self.invoke(call).await {
            Ok(value) => ResultEnvelope::success(id, value),
            Err(e) => ResultEnvelope::failure(id, e),
        }
    }

    async fn invoke(&self, call: CallEnvelope) -> BridgeResult<Value> {
        let Some(handler) = self.registry.lookup(&call.namespace, &call.procedure) else {
            debug!(
                call_id = %call.id,
                namespace = %call.namespace,
                procedure = %call.procedure,
                "Procedure not found"
            );
            self.metrics.record_not_found();
            return Err(BridgeError::procedure_not_found(
                &call.namespace,
                &call.procedure,
            ));
        };

        // Closed only when the binding is gone, in which case nobody reads the answer.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BridgeError::cancelled("binding closed"))?;

        self.metrics.record_dispatched();
        let started = Instant::now();
        let invocation = AssertUnwindSafe(handler.call(call.args)).catch_unwind();

        let joined = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(call_id = %call.id, namespace = %call.namespace,
                          procedure = %call.procedure, "Handler deadline exceeded");
                    self.metrics.record_handler_timeout();
                    return Err(BridgeError::timeout(limit));
                }
            },
            None => invocation.await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match joined {
            Ok(Ok(value)) => {
                debug!(call_id = %call.id, elapsed_ms, "Handler completed");
                self.metrics.record_success(elapsed_ms);
                Ok(value)
            }
            Ok(Err(e)) => {
                debug!(call_id = %call.id, error = %e, "Handler failed");
                self.metrics.record_handler_error(elapsed_ms);
                Err(handler_failure(e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(
                    call_id = %call.id,
                    namespace = %call.namespace,
                    procedure = %call.procedure,
                    panic = %message,
                    "Handler panicked"
                );
                self.metrics.record_handler_error(elapsed_ms);
                Err(BridgeError::handler(format!("handler panicked: {}", message)))
            }
        }
    }
}

fn handler_failure(e: HandlerError) -> BridgeError {
    BridgeError::handler(e.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

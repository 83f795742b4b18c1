//! Sandbox-side channel binding.
//!
//! Owns everything tied to one mounted sandbox: the transport, the pending
//! call table, the result cache, the batch scheduler, and the background
//! listener and sweeper tasks. Closing the binding cancels every call still
//! outstanding on it.

use crate::batch::BatchScheduler;
use crate::cache::{CallCache, Invalidation};
use crate::domain::pending::spawn_cleanup;
use crate::domain::{CallOptions, ConfigError, PendingCallTable, SandboxConfig};
use crate::ipc::listener::ResponseListener;
use serde_json::Value;
use shared_channel::{AllowedOrigin, Transport};
use shared_protocol::{BindingId, BridgeError, BridgeResult, CallEnvelope};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct SandboxBinding {
    id: BindingId,
    config: SandboxConfig,
    host_origin: AllowedOrigin,
    pending: Arc<PendingCallTable>,
    cache: CallCache,
    batcher: BatchScheduler,
    listener: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl SandboxBinding {
    /// Bind `transport`, accepting results only from `host_origin`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect(
        transport: Arc<dyn Transport>,
        host_origin: impl Into<AllowedOrigin>,
        config: SandboxConfig,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let host_origin = host_origin.into();
        let pending = Arc::new(PendingCallTable::new(config.calls.max_outstanding));
        let cache = CallCache::new(config.cache.clone());
        let batcher = BatchScheduler::new(
            config.batch.clone(),
            Arc::clone(&transport),
            Arc::clone(&pending),
        );

        let listener = ResponseListener::new(
            Arc::clone(&pending),
            Arc::clone(&transport),
            host_origin.clone(),
        );
        let listener = tokio::spawn(listener.run());
        let sweeper = spawn_cleanup(&pending, config.calls.cleanup_interval);

        let id = BindingId::new();
        info!(binding_id = %id, host_origin = %host_origin, "Sandbox binding connected");

        Ok(Arc::new(Self {
            id,
            config,
            host_origin,
            pending,
            cache,
            batcher,
            listener,
            sweeper,
        }))
    }

    pub fn id(&self) -> BindingId {
        self.id
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn host_origin(&self) -> &AllowedOrigin {
        &self.host_origin
    }

    pub fn pending(&self) -> &Arc<PendingCallTable> {
        &self.pending
    }

    pub fn cache(&self) -> &CallCache {
        &self.cache
    }

    pub fn batcher(&self) -> &BatchScheduler {
        &self.batcher
    }

    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    /// Calls waiting for a result.
    pub fn outstanding(&self) -> usize {
        self.pending.pending_count()
    }

    /// Send `call` and wait for its result, bypassing the cache.
    ///
    /// Fails with `timeout` at the deadline; a result arriving later is ignored.
    /// Fails with `cancelled` once the binding is closed.
    pub async fn issue(&self, call: CallEnvelope, options: &CallOptions) -> BridgeResult<Value> {
        let timeout = options.timeout.unwrap_or(self.config.calls.default_timeout);
        let rx = self.pending.register(&call, timeout)?;
        let id = call.id.clone();

        debug!(
            binding_id = %self.id,
            call_id = %id,
            namespace = %call.namespace,
            procedure = %call.procedure,
            urgent = options.urgent,
            "Issuing call"
        );
        self.batcher.submit(call, options.urgent).await;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::cancelled("result channel dropped")),
            Err(_) => {
                self.pending.discard(&id);
                debug!(binding_id = %self.id, call_id = %id, "Call timed out");
                Err(BridgeError::timeout(timeout))
            }
        }
    }

    /// Tear the binding down. Every outstanding call fails with `cancelled`,
    /// calls still waiting in the batch window are never sent, and the cache
    /// is emptied.
    ///
    /// Returns how many calls were cancelled. Closing twice is a no-op.
    pub fn close(&self) -> usize {
        let Some(cancelled) = self.pending.close("binding torn down") else {
            return 0;
        };
        let unsent = self.batcher.discard_queued();
        self.listener.abort();
        self.sweeper.abort();
        self.cache.invalidate(Invalidation::All);
        info!(binding_id = %self.id, cancelled, unsent, "Sandbox binding closed");
        cancelled
    }
}

impl Drop for SandboxBinding {
    fn drop(&mut self) {
        self.close();
    }
}

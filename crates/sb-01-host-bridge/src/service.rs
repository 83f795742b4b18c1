//! Host Bridge service: registrations and bindings.

use crate::binding::HostBinding;
use crate::dispatch::Dispatcher;
use crate::domain::{
    ConfigError, HostConfig, HostMetrics, HostMetricsSnapshot, ProcedureKey, ProcedureRegistry,
};
use crate::ports::{AsyncFnHandler, HandlerError, ProcedureHandler, SyncFnHandler};
use dashmap::DashMap;
use serde_json::Value;
use shared_channel::{AllowedOrigin, Transport};
use shared_protocol::{BindingId, NamespaceManifest};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Trusted side of the boundary.
///
/// Procedures are registered once and shared by every binding. Each bound
/// transport gets its own receive loop and concurrency limit.
pub struct HostBridge {
    config: HostConfig,
    registry: Arc<ProcedureRegistry>,
    metrics: Arc<HostMetrics>,
    bindings: DashMap<BindingId, HostBinding>,
}

impl HostBridge {
    pub fn new(config: HostConfig) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    /// Only procedures listed in `manifest` are ever callable, whatever is registered.
    pub fn with_manifest(config: HostConfig, manifest: NamespaceManifest) -> Result<Self, ConfigError> {
        Self::build(config, Some(manifest))
    }

    fn build(config: HostConfig, manifest: Option<NamespaceManifest>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(ProcedureRegistry::new(manifest)),
            metrics: Arc::new(HostMetrics::new()),
            bindings: DashMap::new(),
        })
    }

    /// Expose a procedure. Re-registering the same pair replaces the handler.
    pub fn register(
        &self,
        namespace: impl Into<String>,
        procedure: impl Into<String>,
        handler: impl ProcedureHandler + 'static,
    ) {
        let key = ProcedureKey::new(namespace, procedure);
        let replaced = self.registry.register(key.clone(), Arc::new(handler));
        debug!(procedure = %key, replaced, "Registered procedure");
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&self, namespace: impl Into<String>, procedure: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register(namespace, procedure, AsyncFnHandler(f));
    }

    /// Register a synchronous closure.
    pub fn register_sync<F>(&self, namespace: impl Into<String>, procedure: impl Into<String>, f: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.register(namespace, procedure, SyncFnHandler(f));
    }

    pub fn unregister(&self, namespace: &str, procedure: &str) -> bool {
        self.registry.unregister(&ProcedureKey::new(namespace, procedure))
    }

    /// Registered procedures, sorted.
    pub fn procedures(&self) -> Vec<ProcedureKey> {
        self.registry.procedures()
    }

    /// Start serving calls arriving on `transport` from `allowed_origin`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn bind(
        &self,
        transport: Arc<dyn Transport>,
        allowed_origin: impl Into<AllowedOrigin>,
    ) -> BindingId {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            self.config.handler_timeout,
            self.config.max_concurrent_calls,
        );
        let binding = HostBinding::spawn(
            transport,
            allowed_origin.into(),
            dispatcher,
            Arc::clone(&self.metrics),
            self.config.max_batch_size,
        );
        let id = binding.id;
        info!(binding_id = %id, origin = %binding.allowed_origin, "Bound transport");
        self.bindings.insert(id, binding);
        id
    }

    /// Tear down a binding. In-flight dispatches are aborted and never answered.
    pub fn unbind(&self, binding_id: &BindingId) -> bool {
        match self.bindings.remove(binding_id) {
            Some((_, binding)) => {
                binding.abort();
                info!(binding_id = %binding_id, "Unbound transport");
                true
            }
            None => false,
        }
    }

    /// Live bindings, including ones whose transport has closed but were not unbound.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_bound(&self, binding_id: &BindingId) -> bool {
        self.bindings
            .get(binding_id)
            .is_some_and(|binding| !binding.is_finished())
    }

    pub fn metrics(&self) -> HostMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        for binding in self.bindings.iter() {
            binding.abort();
        }
    }
}

//! Remote namespace proxy.
//!
//! A `RemoteProxy` stands in for one host namespace inside the sandbox. Its
//! method table is the manifest entry it was built from: a name outside the
//! table fails with `procedure-not-permitted` before anything is sent.
//!
//! ```ignore
//! let math = injector.proxy(&binding_id, "math").unwrap();
//! let sum: i64 = math.call_as("add", vec![json!(2), json!(3)]).await?;
//! let add = math.method("add")?;
//! add.call(vec![json!(4), json!(5)]).await?;
//! ```

use crate::domain::{CallOptions, CallSignature};
use crate::ipc::SandboxBinding;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared_protocol::{BridgeError, BridgeResult, CallEnvelope, NamespaceManifest};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct RemoteProxy {
    namespace: Arc<str>,
    procedures: Arc<BTreeSet<String>>,
    binding: Arc<SandboxBinding>,
}

impl RemoteProxy {
    pub fn new(
        namespace: impl Into<String>,
        procedures: BTreeSet<String>,
        binding: Arc<SandboxBinding>,
    ) -> Self {
        Self {
            namespace: Arc::from(namespace.into()),
            procedures: Arc::new(procedures),
            binding,
        }
    }

    /// Proxy for `namespace` as listed in `manifest`, if it is listed.
    pub fn from_manifest(
        manifest: &NamespaceManifest,
        namespace: &str,
        binding: &Arc<SandboxBinding>,
    ) -> Option<Self> {
        manifest
            .procedures(namespace)
            .map(|procedures| Self::new(namespace, procedures.clone(), Arc::clone(binding)))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Permitted procedure names.
    pub fn procedures(&self) -> &BTreeSet<String> {
        &self.procedures
    }

    pub fn permits(&self, procedure: &str) -> bool {
        self.procedures.contains(procedure)
    }

    pub fn binding(&self) -> &Arc<SandboxBinding> {
        &self.binding
    }

    /// Handle for one permitted procedure.
    pub fn method(&self, procedure: &str) -> BridgeResult<RemoteMethod> {
        self.check_permitted(procedure)?;
        Ok(RemoteMethod {
            proxy: self.clone(),
            procedure: procedure.to_string(),
        })
    }

    pub async fn call(&self, procedure: &str, args: Vec<Value>) -> BridgeResult<Value> {
        self.call_with(procedure, args, CallOptions::default()).await
    }

    /// Invoke `procedure` with per-call overrides.
    pub async fn call_with(
        &self,
        procedure: &str,
        args: Vec<Value>,
        options: CallOptions,
    ) -> BridgeResult<Value> {
        self.check_permitted(procedure)?;
        let call = CallEnvelope::new(&*self.namespace, procedure, args);

        let cache = self.binding.cache();
        if !cache.admits(&call.namespace, &call.procedure, &options) {
            return self.binding.issue(call, &options).await;
        }

        let signature = CallSignature::of(&call);
        let ttl = cache.ttl_for(&call.namespace, options.ttl);
        let binding = Arc::clone(&self.binding);
        cache
            .get_or_fetch(signature, ttl, async move { binding.issue(call, &options).await })
            .await
    }

    /// Invoke `procedure` and deserialize its result.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        procedure: &str,
        args: Vec<Value>,
    ) -> BridgeResult<T> {
        let value = self.call(procedure, args).await?;
        serde_json::from_value(value).map_err(|e| {
            BridgeError::malformed(format!(
                "unexpected result shape from {}.{}: {}",
                self.namespace, procedure, e
            ))
        })
    }

    fn check_permitted(&self, procedure: &str) -> BridgeResult<()> {
        if self.permits(procedure) {
            return Ok(());
        }
        debug!(
            namespace = %self.namespace,
            procedure,
            "Rejecting call outside the manifest"
        );
        Err(BridgeError::procedure_not_permitted(&self.namespace, procedure))
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("namespace", &self.namespace)
            .field("procedures", &self.procedures)
            .field("binding", &self.binding.id())
            .finish()
    }
}

/// One permitted procedure of a [`RemoteProxy`].
#[derive(Clone, Debug)]
pub struct RemoteMethod {
    proxy: RemoteProxy,
    procedure: String,
}

impl RemoteMethod {
    /// `namespace.procedure`
    pub fn name(&self) -> String {
        format!("{}.{}", self.proxy.namespace(), self.procedure)
    }

    pub async fn call(&self, args: Vec<Value>) -> BridgeResult<Value> {
        self.proxy.call(&self.procedure, args).await
    }

    pub async fn call_with(&self, args: Vec<Value>, options: CallOptions) -> BridgeResult<Value> {
        self.proxy.call_with(&self.procedure, args, options).await
    }

    pub async fn call_as<T: DeserializeOwned>(&self, args: Vec<Value>) -> BridgeResult<T> {
        self.proxy.call_as(&self.procedure, args).await
    }
}

//! Procedure registry.
//!
//! Maps `(namespace, procedure)` to a handler. When the bridge was built with a
//! manifest, only pairs present in both the manifest and the registry are
//! callable; everything else looks like a missing procedure.

use crate::ports::ProcedureHandler;
use dashmap::DashMap;
use shared_protocol::NamespaceManifest;
use std::fmt;
use std::sync::Arc;

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcedureKey {
    pub namespace: String,
    pub procedure: String,
}

impl ProcedureKey {
    pub fn new(namespace: impl Into<String>, procedure: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            procedure: procedure.into(),
        }
    }
}

impl fmt::Display for ProcedureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.procedure)
    }
}

pub struct ProcedureRegistry {
    handlers: DashMap<ProcedureKey, Arc<dyn ProcedureHandler>>,
    manifest: Option<NamespaceManifest>,
}

impl ProcedureRegistry {
    pub fn new(manifest: Option<NamespaceManifest>) -> Self {
        Self {
            handlers: DashMap::new(),
            manifest,
        }
    }

    /// Add or replace a handler. Returns true if a previous handler was replaced.
    pub fn register(&self, key: ProcedureKey, handler: Arc<dyn ProcedureHandler>) -> bool {
        self.handlers.insert(key, handler).is_some()
    }

    pub fn unregister(&self, key: &ProcedureKey) -> bool {
        self.handlers.remove(key).is_some()
    }

    /// Resolve a callable handler.
    pub fn lookup(&self, namespace: &str, procedure: &str) -> Option<Arc<dyn ProcedureHandler>> {
        if let Some(manifest) = &self.manifest {
            if !manifest.permits(namespace, procedure) {
                return None;
            }
        }
        self.handlers
            .get(&ProcedureKey::new(namespace, procedure))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Registered keys, sorted.
    pub fn procedures(&self) -> Vec<ProcedureKey> {
        let mut keys: Vec<_> = self.handlers.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn manifest(&self) -> Option<&NamespaceManifest> {
        self.manifest.as_ref()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

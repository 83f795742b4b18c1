//! Namespace injector.
//!
//! Keeps, per binding, the scope of namespace proxies visible to sandboxed
//! code. Installing is explicit (`inject`), and so is removal (`remove`,
//! `teardown`); nothing is looked up implicitly.

use crate::cache::Invalidation;
use crate::ipc::SandboxBinding;
use crate::proxy::RemoteProxy;
use dashmap::DashMap;
use shared_protocol::{BindingId, NamespaceManifest};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Proxies installed for one binding.
struct Scope {
    binding: Arc<SandboxBinding>,
    proxies: BTreeMap<String, RemoteProxy>,
}

#[derive(Default)]
pub struct NamespaceInjector {
    scopes: DashMap<BindingId, Scope>,
}

impl NamespaceInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install one proxy per manifest namespace into `binding`'s scope.
    ///
    /// A namespace that is already installed is replaced. Returns the names
    /// installed by this call.
    pub fn inject(&self, manifest: &NamespaceManifest, binding: &Arc<SandboxBinding>) -> BTreeSet<String> {
        let mut scope = self.scopes.entry(binding.id()).or_insert_with(|| Scope {
            binding: Arc::clone(binding),
            proxies: BTreeMap::new(),
        });

        let mut installed = BTreeSet::new();
        for (namespace, procedures) in manifest.iter() {
            let proxy = RemoteProxy::new(namespace.as_str(), procedures.clone(), Arc::clone(binding));
            scope.proxies.insert(namespace.clone(), proxy);
            installed.insert(namespace.clone());
        }

        info!(
            binding_id = %binding.id(),
            namespaces = ?installed,
            "Injected namespaces"
        );
        installed
    }

    /// Namespace names a manifest would install, without installing anything.
    pub fn extract(manifest: &NamespaceManifest) -> BTreeSet<String> {
        manifest.namespace_names()
    }

    /// Uninstall `names` from a binding's scope.
    ///
    /// Outstanding calls into those namespaces fail with `cancelled` and their
    /// cached results are dropped. Returns the names actually removed.
    pub fn remove(&self, binding_id: &BindingId, names: &[&str]) -> BTreeSet<String> {
        let Some(mut scope) = self.scopes.get_mut(binding_id) else {
            return BTreeSet::new();
        };

        let removed: BTreeSet<String> = names
            .iter()
            .filter(|name| scope.proxies.remove(**name).is_some())
            .map(|name| name.to_string())
            .collect();
        if removed.is_empty() {
            return removed;
        }

        let targets: Vec<&str> = removed.iter().map(String::as_str).collect();
        let cancelled = scope
            .binding
            .pending()
            .cancel_namespaces(&targets, "namespace removed");
        for name in &removed {
            scope
                .binding
                .cache()
                .invalidate(Invalidation::Namespace(name.clone()));
        }

        debug!(
            binding_id = %binding_id,
            namespaces = ?removed,
            cancelled,
            "Removed namespaces"
        );
        removed
    }

    /// Installed proxy for `namespace`, if any.
    pub fn proxy(&self, binding_id: &BindingId, namespace: &str) -> Option<RemoteProxy> {
        self.scopes
            .get(binding_id)
            .and_then(|scope| scope.proxies.get(namespace).cloned())
    }

    /// Names installed for a binding.
    pub fn installed(&self, binding_id: &BindingId) -> BTreeSet<String> {
        self.scopes
            .get(binding_id)
            .map(|scope| scope.proxies.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a binding's whole scope and close the binding.
    ///
    /// Returns how many outstanding calls were cancelled.
    pub fn teardown(&self, binding_id: &BindingId) -> usize {
        match self.scopes.remove(binding_id) {
            Some((_, scope)) => {
                let cancelled = scope.binding.close();
                info!(
                    binding_id = %binding_id,
                    namespaces = scope.proxies.len(),
                    cancelled,
                    "Tore down sandbox scope"
                );
                cancelled
            }
            None => 0,
        }
    }

    /// Bindings with an installed scope.
    pub fn bindings(&self) -> Vec<BindingId> {
        self.scopes.iter().map(|entry| *entry.key()).collect()
    }
}

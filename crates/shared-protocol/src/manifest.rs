//! Namespace manifest: the entire callable surface of one sandbox instance.
//!
//! JSON form: `{ "math": ["add", "mul"], "fs": ["read"] }`.
//! Loaded once at bootstrap and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors from manifest loading.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid namespace name '{0}'")]
    InvalidNamespace(String),

    #[error("invalid procedure name '{procedure}' in namespace '{namespace}'")]
    InvalidProcedure { namespace: String, procedure: String },
}

/// Namespace name → permitted procedure names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceManifest {
    namespaces: BTreeMap<String, BTreeSet<String>>,
}

impl NamespaceManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON manifest.
    pub fn from_json(raw: &str) -> Result<Self, ManifestError> {
        let manifest: NamespaceManifest = serde_json::from_str(raw)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Builder used by host bootstrap code and tests.
    pub fn with_namespace<I, S>(mut self, namespace: impl Into<String>, procedures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespaces
            .entry(namespace.into())
            .or_default()
            .extend(procedures.into_iter().map(Into::into));
        self
    }

    /// Names must be non-empty and free of whitespace and dots, so that
    /// `namespace.procedure` stays unambiguous.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (namespace, procedures) in &self.namespaces {
            if !is_valid_name(namespace) {
                return Err(ManifestError::InvalidNamespace(namespace.clone()));
            }
            if let Some(bad) = procedures.iter().find(|p| !is_valid_name(p)) {
                return Err(ManifestError::InvalidProcedure {
                    namespace: namespace.clone(),
                    procedure: bad.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn permits(&self, namespace: &str, procedure: &str) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|procedures| procedures.contains(procedure))
    }

    pub fn procedures(&self, namespace: &str) -> Option<&BTreeSet<String>> {
        self.namespaces.get(namespace)
    }

    pub fn namespace_names(&self) -> BTreeSet<String> {
        self.namespaces.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.namespaces.iter()
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.') && !name.chars().any(char::is_whitespace)
}

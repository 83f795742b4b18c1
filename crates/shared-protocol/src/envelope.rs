//! Call and result envelopes.
//!
//! A `CallEnvelope` is created by the sandbox side on every invocation and is
//! immutable once sent. The host answers each one with exactly one
//! `ResultEnvelope` carrying the same id.

use crate::error::{BridgeError, BridgeResult, ErrorKind};
use crate::ids::CallId;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single procedure invocation crossing the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEnvelope {
    pub id: CallId,
    pub namespace: String,
    pub procedure: String,
    pub args: Vec<Value>,
    /// Milliseconds since the Unix epoch.
    pub issued_at: u64,
}

impl CallEnvelope {
    /// Build an envelope with a fresh id, stamped with the current time.
    pub fn new(namespace: impl Into<String>, procedure: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: CallId::generate(),
            namespace: namespace.into(),
            procedure: procedure.into(),
            args,
            issued_at: unix_millis(),
        }
    }

    /// `namespace.procedure`, used in logs and config keys.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.procedure)
    }
}

/// Outcome of a call: the handler's value or a classified failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure { kind: ErrorKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn into_result(self) -> BridgeResult<Value> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure { kind, message } => Err(BridgeError::new(kind, message)),
        }
    }
}

impl From<BridgeResult<Value>> for Outcome {
    fn from(result: BridgeResult<Value>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(e) => Outcome::Failure {
                kind: e.kind,
                message: e.message,
            },
        }
    }
}

/// The host's answer to one `CallEnvelope`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEnvelope {
    pub id: CallId,
    pub outcome: Outcome,
}

impl ResultEnvelope {
    pub fn success(id: CallId, value: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Success(value),
        }
    }

    pub fn failure(id: CallId, error: BridgeError) -> Self {
        Self {
            id,
            outcome: Outcome::Failure {
                kind: error.kind,
                message: error.message,
            },
        }
    }

    pub fn into_result(self) -> BridgeResult<Value> {
        self.outcome.into_result()
    }
}

/// Current Unix time in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Bridge error taxonomy.
//!
//! Every failure that reaches a caller carries one of these kinds. The kebab-case
//! names are part of the wire format (`outcome.errorKind`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Error kinds recognised on both sides of the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Frame failed structural validation.
    MalformedMessage,
    /// Frame arrived from an origin the binding does not accept.
    OriginRejected,
    /// Host has no handler for the (namespace, procedure) pair.
    ProcedureNotFound,
    /// Sandbox manifest does not list the (namespace, procedure) pair.
    ProcedureNotPermitted,
    /// Handler failed or panicked.
    HandlerError,
    /// No result arrived before the deadline.
    Timeout,
    /// Binding was torn down while the call was outstanding.
    Cancelled,
    /// Outstanding-call ceiling reached.
    TooManyOutstanding,
    /// The transport refused the frame.
    TransportClosed,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::MalformedMessage,
        ErrorKind::OriginRejected,
        ErrorKind::ProcedureNotFound,
        ErrorKind::ProcedureNotPermitted,
        ErrorKind::HandlerError,
        ErrorKind::Timeout,
        ErrorKind::Cancelled,
        ErrorKind::TooManyOutstanding,
        ErrorKind::TransportClosed,
    ];

    /// Wire name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedMessage => "malformed-message",
            ErrorKind::OriginRejected => "origin-rejected",
            ErrorKind::ProcedureNotFound => "procedure-not-found",
            ErrorKind::ProcedureNotPermitted => "procedure-not-permitted",
            ErrorKind::HandlerError => "handler-error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::TooManyOutstanding => "too-many-outstanding",
            ErrorKind::TransportClosed => "transport-closed",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure observed by the original caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn malformed(details: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::MalformedMessage,
            format!("Malformed message: {}", details.into()),
        )
    }

    pub fn origin_rejected(origin: &str) -> Self {
        Self::new(
            ErrorKind::OriginRejected,
            format!("Origin not allowed: {}", origin),
        )
    }

    pub fn procedure_not_found(namespace: &str, procedure: &str) -> Self {
        Self::new(
            ErrorKind::ProcedureNotFound,
            format!("Procedure not found: {}.{}", namespace, procedure),
        )
    }

    pub fn procedure_not_permitted(namespace: &str, procedure: &str) -> Self {
        Self::new(
            ErrorKind::ProcedureNotPermitted,
            format!("Procedure not permitted: {}.{}", namespace, procedure),
        )
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandlerError, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Call timed out after {}ms", after.as_millis()),
        )
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Cancelled,
            format!("Call cancelled: {}", reason.into()),
        )
    }

    pub fn too_many_outstanding(limit: usize) -> Self {
        Self::new(
            ErrorKind::TooManyOutstanding,
            format!("Too many outstanding calls (limit {})", limit),
        )
    }

    pub fn transport_closed(details: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::TransportClosed,
            format!("Transport closed: {}", details.into()),
        )
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::malformed(e.to_string())
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

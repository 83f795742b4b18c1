//! Cache signatures.
//!
//! `(namespace, procedure, sha256(canonical args))`. Canonical JSON keeps
//! array order and sorts object keys, so `{"a":1,"b":2}` and `{"b":2,"a":1}`
//! produce the same signature while `[1,2]` and `[2,1]` do not.

use serde_json::Value;
use sha2::{Digest, Sha256};
use shared_protocol::CallEnvelope;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSignature {
    pub namespace: String,
    pub procedure: String,
    /// Hex-encoded SHA-256 of the canonical argument list
    pub args_hash: String,
}

impl CallSignature {
    pub fn new(namespace: impl Into<String>, procedure: impl Into<String>, args: &[Value]) -> Self {
        Self {
            namespace: namespace.into(),
            procedure: procedure.into(),
            args_hash: hash_args(args),
        }
    }

    pub fn of(call: &CallEnvelope) -> Self {
        Self::new(call.namespace.as_str(), call.procedure.as_str(), &call.args)
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.args_hash.get(..12).unwrap_or(&self.args_hash);
        write!(f, "{}.{}#{}", self.namespace, self.procedure, short)
    }
}

/// Hex SHA-256 of the canonical encoding of `args`.
pub fn hash_args(args: &[Value]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"[");
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            hasher.update(b",");
        }
        write_canonical(arg, &mut hasher);
    }
    hasher.update(b"]");
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Array(items) => {
            hasher.update(b"[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                write_canonical(item, hasher);
            }
            hasher.update(b"]");
        }
        Value::Object(map) => {
            // `Map` is already key-ordered unless serde_json's `preserve_order`
            // feature is enabled somewhere in the build; the sort keeps the
            // hash independent of that feature.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"{");
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                hasher.update(Value::String(key.clone()).to_string().as_bytes());
                hasher.update(b":");
                if let Some(item) = map.get(key) {
                    write_canonical(item, hasher);
                }
            }
            hasher.update(b"}");
        }
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}

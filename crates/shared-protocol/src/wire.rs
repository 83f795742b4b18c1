//! Wire framing and structural validation.
//!
//! Frame shape (JSON):
//!
//! ```text
//! { "v": 1, "kind": "call",   "id": "..", "namespace": "..", "procedure": "..",
//!   "args": [..], "issuedAt": 1700000000000 }
//! { "v": 1, "kind": "result", "id": "..",
//!   "outcome": { "ok": true, "value": .. } | { "ok": false, "errorKind": "..", "message": ".." } }
//! { "v": 1, "kind": "batch",  "id": "..", "messages": [ <call>.. ] | [ <result>.. ] }
//! ```
//!
//! Unknown fields are ignored. Anything else that does not match the shape is
//! rejected with `malformed-message` and never dispatched.

use crate::envelope::{CallEnvelope, Outcome, ResultEnvelope};
use crate::error::{BridgeError, BridgeResult, ErrorKind};
use crate::ids::CallId;
use crate::PROTOCOL_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const KIND_CALL: &str = "call";
const KIND_RESULT: &str = "result";
const KIND_BATCH: &str = "batch";

/// A decoded, structurally valid frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call(CallEnvelope),
    Result(ResultEnvelope),
    /// Several calls (sandbox → host) or several results (host → sandbox)
    /// multiplexed into one frame. Members are never batches themselves.
    Batch { id: CallId, messages: Vec<Message> },
}

/// A frame that failed validation.
///
/// `ids` holds every correlation id that could still be read from the frame,
/// so the receiver can answer or fail those calls instead of letting them
/// run into their deadline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct DecodeError {
    pub ids: Vec<CallId>,
    pub error: BridgeError,
}

impl DecodeError {
    fn anonymous(reason: impl Into<String>) -> Self {
        Self {
            ids: Vec::new(),
            error: BridgeError::malformed(reason),
        }
    }
}

impl Message {
    /// Wrap several calls or results into one batch frame with a fresh id.
    pub fn batch(messages: Vec<Message>) -> Self {
        Message::Batch {
            id: CallId::generate(),
            messages,
        }
    }

    pub fn id(&self) -> &CallId {
        match self {
            Message::Call(call) => &call.id,
            Message::Result(result) => &result.id,
            Message::Batch { id, .. } => id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Call(_) => KIND_CALL,
            Message::Result(_) => KIND_RESULT,
            Message::Batch { .. } => KIND_BATCH,
        }
    }

    /// Serialize to the JSON text carried by the transport.
    pub fn encode(&self) -> BridgeResult<String> {
        Ok(serde_json::to_string(&WireFrame::from(self))?)
    }

    /// Parse and validate a frame received from the transport.
    pub fn decode(payload: &str) -> Result<Message, DecodeError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| DecodeError::anonymous(format!("invalid JSON: {}", e)))?;
        Self::from_value(&value)
    }

    /// Validate an already parsed frame.
    pub fn from_value(value: &Value) -> Result<Message, DecodeError> {
        decode_frame(value, false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENCODING
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireFrame<'a> {
    v: u16,
    kind: &'static str,
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    procedure: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issued_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<WireOutcome<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<WireFrame<'a>>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireOutcome<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireFrame<'a> {
    fn from(message: &'a Message) -> Self {
        let mut frame = WireFrame {
            v: PROTOCOL_VERSION,
            kind: message.kind_name(),
            id: message.id().as_str(),
            namespace: None,
            procedure: None,
            args: None,
            issued_at: None,
            outcome: None,
            messages: None,
        };
        match message {
            Message::Call(call) => {
                frame.namespace = Some(call.namespace.as_str());
                frame.procedure = Some(call.procedure.as_str());
                frame.args = Some(call.args.as_slice());
                frame.issued_at = Some(call.issued_at);
            }
            Message::Result(result) => {
                frame.outcome = Some(match &result.outcome {
                    Outcome::Success(value) => WireOutcome {
                        ok: true,
                        value: Some(value),
                        error_kind: None,
                        message: None,
                    },
                    Outcome::Failure { kind, message } => WireOutcome {
                        ok: false,
                        value: None,
                        error_kind: Some(kind.as_str()),
                        message: Some(message.as_str()),
                    },
                });
            }
            Message::Batch { messages, .. } => {
                frame.messages = Some(messages.iter().map(WireFrame::from).collect());
            }
        }
        frame
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DECODING
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcome {
    ok: bool,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error_kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn read_id(obj: &Map<String, Value>) -> Option<CallId> {
    obj.get("id").and_then(Value::as_str).and_then(CallId::parse)
}

fn decode_frame(value: &Value, nested: bool) -> Result<Message, DecodeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::anonymous("frame is not an object"))?;

    let kind = obj.get("kind").and_then(Value::as_str);
    if kind == Some(KIND_BATCH) {
        if nested {
            return Err(DecodeError {
                ids: read_id(obj).into_iter().collect(),
                error: BridgeError::malformed("nested batch"),
            });
        }
        return decode_batch(obj);
    }

    let id = read_id(obj);
    let reject = |reason: String| DecodeError {
        ids: id.iter().cloned().collect(),
        error: BridgeError::malformed(reason),
    };

    check_version(obj).map_err(reject)?;
    let call_id = id.clone().ok_or_else(|| reject("missing or empty id".into()))?;

    match kind {
        Some(KIND_CALL) => decode_call(call_id, obj).map(Message::Call).map_err(reject),
        Some(KIND_RESULT) => decode_result(call_id, obj)
            .map(Message::Result)
            .map_err(reject),
        Some(other) => Err(reject(format!("unknown kind '{}'", other))),
        None => Err(reject("missing kind".into())),
    }
}

fn check_version(obj: &Map<String, Value>) -> Result<(), String> {
    match obj.get("v").and_then(Value::as_u64) {
        Some(v) if v == u64::from(PROTOCOL_VERSION) => Ok(()),
        Some(v) => Err(format!("unsupported protocol version {}", v)),
        None => Err("missing protocol version".into()),
    }
}

fn required_name(obj: &Map<String, Value>, field: &str) -> Result<String, String> {
    match obj.get(field).and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
        _ => Err(format!("missing or empty {}", field)),
    }
}

fn decode_call(id: CallId, obj: &Map<String, Value>) -> Result<CallEnvelope, String> {
    let namespace = required_name(obj, "namespace")?;
    let procedure = required_name(obj, "procedure")?;
    let args = match obj.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return Err("args must be an array".into()),
    };
    let issued_at = match obj.get("issuedAt") {
        None | Some(Value::Null) => 0,
        Some(ts) => ts
            .as_u64()
            .ok_or_else(|| "issuedAt must be a non-negative integer".to_string())?,
    };
    Ok(CallEnvelope {
        id,
        namespace,
        procedure,
        args,
        issued_at,
    })
}

fn decode_result(id: CallId, obj: &Map<String, Value>) -> Result<ResultEnvelope, String> {
    let raw = obj.get("outcome").ok_or("missing outcome")?;
    let raw: RawOutcome =
        serde_json::from_value(raw.clone()).map_err(|e| format!("invalid outcome: {}", e))?;

    let outcome = if raw.ok {
        Outcome::Success(raw.value.unwrap_or(Value::Null))
    } else {
        let name = raw.error_kind.ok_or("failure outcome without errorKind")?;
        let kind =
            ErrorKind::parse(&name).ok_or_else(|| format!("unknown errorKind '{}'", name))?;
        Outcome::Failure {
            kind,
            message: raw.message.unwrap_or_default(),
        }
    };
    Ok(ResultEnvelope { id, outcome })
}

fn decode_batch(obj: &Map<String, Value>) -> Result<Message, DecodeError> {
    let members = obj.get("messages").and_then(Value::as_array);
    let member_ids: Vec<CallId> = members
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object().and_then(read_id))
                .collect()
        })
        .unwrap_or_default();
    let reject = |reason: String| DecodeError {
        ids: member_ids.clone(),
        error: BridgeError::malformed(reason),
    };

    check_version(obj).map_err(reject)?;
    let id = read_id(obj).ok_or_else(|| reject("batch without id".into()))?;
    let members = members.ok_or_else(|| reject("batch without messages array".into()))?;
    if members.is_empty() {
        return Err(reject("empty batch".into()));
    }

    let mut messages = Vec::with_capacity(members.len());
    for (index, member) in members.iter().enumerate() {
        match decode_frame(member, true) {
            Ok(message) => messages.push(message),
            Err(e) => {
                let reason = e.error.message.trim_start_matches("Malformed message: ");
                return Err(reject(format!("batch member {}: {}", index, reason)));
            }
        }
    }

    let all_calls = messages.iter().all(|m| matches!(m, Message::Call(_)));
    let all_results = messages.iter().all(|m| matches!(m, Message::Result(_)));
    if !all_calls && !all_results {
        return Err(reject("batch mixes calls and results".into()));
    }

    Ok(Message::Batch { id, messages })
}

//! Outbound (driven) port: the host procedures the bridge dispatches to.
//!
//! Handlers are the only place host-side business logic runs. The bridge
//! neither knows nor cares how a result was computed.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

/// Failure reported by a handler. Travels back as `handler-error`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Arguments did not have the shape the procedure expects
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    /// Procedure-defined failure
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(e: anyhow::Error) -> Self {
        HandlerError::Failed(format!("{:#}", e))
    }
}

/// A callable host procedure.
#[async_trait]
pub trait ProcedureHandler: Send + Sync {
    /// Invoke the procedure with the deserialized call arguments.
    async fn call(&self, args: Vec<Value>) -> Result<Value, HandlerError>;
}

/// Adapter for async closures: `|args| async move { .. }`.
pub struct AsyncFnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ProcedureHandler for AsyncFnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, HandlerError> {
        (self.0)(args).await
    }
}

/// Adapter for plain synchronous closures.
pub struct SyncFnHandler<F>(pub F);

#[async_trait]
impl<F> ProcedureHandler for SyncFnHandler<F>
where
    F: Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, HandlerError> {
        (self.0)(args)
    }
}

/// Decode the positional argument list into a tuple or struct.
///
/// ```ignore
/// let (a, b): (i64, i64) = decode_args(args)?;
/// ```
pub fn decode_args<T: DeserializeOwned>(args: Vec<Value>) -> Result<T, HandlerError> {
    serde_json::from_value(Value::Array(args)).map_err(|e| HandlerError::InvalidArgs(e.to_string()))
}

/// Serialize a handler's return value.
pub fn encode_result<T: Serialize>(value: T) -> Result<Value, HandlerError> {
    serde_json::to_value(value).map_err(|e| HandlerError::Failed(format!("unserializable result: {}", e)))
}

//! # Shared Channel - Transport Port for the Isolation Boundary
//!
//! The bridge never talks to a concrete messaging API. Both sides hold an
//! `Arc<dyn Transport>`: an endpoint that sends JSON text and receives
//! [`Frame`]s stamped with the sender's origin, the way a browser stamps
//! `MessageEvent.origin` on `postMessage` traffic.
//!
//! ```text
//! ┌──────────────┐   send(payload)    ┌──────────────┐
//! │  Endpoint A  │ ─────────────────► │  Endpoint B  │
//! │ origin = "a" │                    │ recv() ──► Frame { origin: "a", payload }
//! └──────────────┘                    └──────────────┘
//! ```
//!
//! - [`memory::duplex`] builds an in-process pair (embedding and tests)
//! - [`AllowedOrigin`] decides which stamped origins a binding accepts

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod memory;
pub mod origin;

pub use memory::{duplex, MemoryTransport};
pub use origin::AllowedOrigin;

use async_trait::async_trait;
use shared_protocol::BridgeError;

/// Maximum frames buffered per direction before `send` waits.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// An inbound payload with the origin stamped by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub origin: String,
    pub payload: String,
}

/// Transport error types
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

impl From<TransportError> for BridgeError {
    fn from(e: TransportError) -> Self {
        BridgeError::transport_closed(e.to_string())
    }
}

/// One endpoint of a cross-context channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a serialized frame to the other side.
    async fn send(&self, payload: String) -> Result<(), TransportError>;

    /// Receive the next inbound frame. `Err(Closed)` ends the stream.
    async fn recv(&self) -> Result<Frame, TransportError>;

    /// Origin this endpoint stamps on everything it sends.
    fn local_origin(&self) -> &str;
}

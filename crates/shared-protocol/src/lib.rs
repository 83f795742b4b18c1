//! # Shared Protocol - Wire Format for the Sandbox Service Bridge
//!
//! Defines everything both sides of the isolation boundary must agree on:
//!
//! - **Envelopes**: `CallEnvelope` / `ResultEnvelope`, correlated by `CallId`
//! - **Wire messages**: `call`, `result` and `batch` frames with a version tag
//! - **Error taxonomy**: `ErrorKind` and the `BridgeError` carried back to callers
//! - **Manifest**: the namespace → procedure allow-list for one sandbox
//!
//! ## Message Flow
//!
//! ```text
//! ┌──────────────────┐   call / batch(call..)    ┌──────────────────┐
//! │  Sandbox side    │ ────────────────────────► │    Host side     │
//! │  (RemoteProxy)   │                           │   (HostBridge)   │
//! │                  │ ◄──────────────────────── │                  │
//! └──────────────────┘  result / batch(result..) └──────────────────┘
//! ```
//!
//! Every inbound frame is validated structurally by [`Message::decode`] before
//! anything is dispatched. Frames that fail validation surface as
//! `malformed-message` and never reach handler code.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod envelope;
pub mod error;
pub mod humantime_serde;
pub mod ids;
pub mod manifest;
pub mod wire;

pub use envelope::{unix_millis, CallEnvelope, Outcome, ResultEnvelope};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use ids::{BindingId, CallId};
pub use manifest::{ManifestError, NamespaceManifest};
pub use wire::{DecodeError, Message};

/// Current protocol version carried in the `v` field of every frame.
pub const PROTOCOL_VERSION: u16 = 1;

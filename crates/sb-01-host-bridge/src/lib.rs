//! # Host Bridge
//!
//! Trusted side of the sandbox service bridge. The host registers
//! procedures under namespaces, binds one transport per mounted sandbox, and
//! answers every valid call with exactly one result carrying the call's id.
//!
//! ## Boundary Checks
//!
//! | Check | Outcome | Location |
//! |-------|---------|----------|
//! | Frame origin differs from the binding's allowed origin | dropped silently, `origin_rejected` metric | `binding.rs` |
//! | Frame fails structural validation | `failure(malformed-message)` per readable id | `binding.rs` |
//! | Batch larger than `max_batch_size` | `failure(malformed-message)` per member | `binding.rs` |
//! | Pair not registered (or not in the host manifest) | `failure(procedure-not-found)` | `dispatch.rs` |
//! | Handler returns an error or panics | `failure(handler-error)` | `dispatch.rs` |
//! | Handler exceeds `handler_timeout` | `failure(timeout)` | `dispatch.rs` |
//!
//! ## Module Structure
//!
//! ```text
//! service.rs   - HostBridge: register / bind / unbind
//! binding.rs   - per-transport receive loop
//! dispatch.rs  - CallEnvelope → ResultEnvelope
//! domain/      - config, registry, metrics
//! ports/       - ProcedureHandler (outbound)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let bridge = HostBridge::new(HostConfig::default())?;
//! bridge.register_sync("math", "add", |args| {
//!     let (a, b): (i64, i64) = decode_args(args)?;
//!     Ok(json!(a + b))
//! });
//! let binding = bridge.bind(Arc::new(host_end), "https://widgets.example");
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod binding;
pub mod dispatch;
pub mod domain;
pub mod ports;
pub mod service;

pub use binding::HostBinding;
pub use dispatch::Dispatcher;
pub use domain::{ConfigError, HostConfig, HostMetricsSnapshot, ProcedureKey};
pub use ports::{decode_args, encode_result, HandlerError, ProcedureHandler};
pub use service::HostBridge;

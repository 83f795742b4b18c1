//! # Sandbox Runtime
//!
//! Untrusted side of the sandbox service bridge. Sandboxed code sees each
//! host namespace as a [`RemoteProxy`]; every call through it is correlated,
//! optionally cached, batched with its neighbours, and awaited with a deadline.
//!
//! ## Call Path
//!
//! ```text
//! RemoteProxy::call ──► manifest check ──► CallCache ──► PendingCallTable ──► BatchScheduler ──► transport
//!        ▲                 (not-permitted)   (hit / join)     (register)        (window)
//!        │
//!        └──────── ResponseListener ◄── result / batch of results ◄── transport
//! ```
//!
//! ## Guarantees
//!
//! | Guarantee | Enforcement |
//! |-----------|-------------|
//! | Calls outside the manifest never reach the transport | `proxy.rs` - `check_permitted()` |
//! | A result settles at most one call, late results are ignored | `domain/pending.rs` - `resolve()` |
//! | Missing results fail with `timeout` | `ipc/binding.rs` - `issue()`, `cleanup_task()` |
//! | Identical concurrent calls cross the boundary once | `cache.rs` - `get_or_fetch()` |
//! | Teardown fails every outstanding call with `cancelled` | `ipc/binding.rs` - `close()` |
//!
//! ## Module Structure
//!
//! ```text
//! injector.rs   - NamespaceInjector: per-binding proxy scopes
//! proxy.rs      - RemoteProxy / RemoteMethod
//! cache.rs      - CallCache (TTL + coalescing)
//! batch.rs      - BatchScheduler (window + flush)
//! ipc/          - SandboxBinding, ResponseListener
//! domain/       - config, pending table, signatures, call options
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod batch;
pub mod cache;
pub mod domain;
pub mod injector;
pub mod ipc;
pub mod proxy;

pub use batch::{BatchScheduler, BatchStats};
pub use cache::{CacheStats, CallCache, Invalidation};
pub use domain::{
    BatchConfig, CacheConfig, CallConfig, CallOptions, CallSignature, ConfigError,
    PendingCallTable, PendingStatsSnapshot, SandboxConfig,
};
pub use injector::NamespaceInjector;
pub use ipc::{ResponseListener, SandboxBinding};
pub use proxy::{RemoteMethod, RemoteProxy};

//! # Sandbox Bridge Test Suite
//!
//! Unified test crate wiring a real [`HostBridge`](sb_01_host_bridge::HostBridge)
//! to a real [`SandboxBinding`](sb_02_sandbox_runtime::SandboxBinding) over an
//! in-memory duplex channel.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── integration/
//! │   ├── harness.rs     # host + sandbox fixture
//! │   ├── scenarios.rs   # happy paths: calls, caching, batching
//! │   ├── failures.rs    # timeouts, teardown, handler failures
//! │   └── boundary.rs    # hostile frames: foreign origins, forged ids, junk
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p sb-tests
//!
//! # With logs
//! RUST_LOG=debug cargo test -p sb-tests -- --nocapture
//! ```

#![allow(dead_code)]

pub mod integration;

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber honouring `RUST_LOG`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

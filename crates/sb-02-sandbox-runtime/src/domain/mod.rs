//! Domain types for the Sandbox Runtime.

pub mod config;
pub mod options;
pub mod pending;
pub mod signature;

pub use config::{BatchConfig, CacheConfig, CallConfig, ConfigError, SandboxConfig};
pub use options::CallOptions;
pub use pending::{CallReceiver, PendingCallTable, PendingStatsSnapshot};
pub use signature::CallSignature;

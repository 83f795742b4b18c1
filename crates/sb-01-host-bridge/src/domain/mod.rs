//! Domain types for the Host Bridge.

pub mod config;
pub mod metrics;
pub mod registry;

pub use config::{ConfigError, HostConfig};
pub use metrics::{HostMetrics, HostMetricsSnapshot};
pub use registry::{ProcedureKey, ProcedureRegistry};

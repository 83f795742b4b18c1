//! Boundary plumbing on the sandbox side.
//!
//! - `binding`: one mounted sandbox's transport, tables and tasks
//! - `listener`: settles pending calls from host frames

pub mod binding;
pub mod listener;

pub use binding::SandboxBinding;
pub use listener::ResponseListener;

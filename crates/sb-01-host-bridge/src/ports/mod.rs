//! Ports (hexagonal architecture)
//!
//! - `outbound`: the procedure handlers the bridge drives

pub mod outbound;

pub use outbound::{
    decode_args, encode_result, AsyncFnHandler, HandlerError, ProcedureHandler, SyncFnHandler,
};

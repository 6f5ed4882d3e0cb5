//! Error types for the bridge
//!
//! Every failure the bridge can observe is a `BridgeError`. The non-throwing
//! entry points (`ObjectProxy::get_member`, `Trampoline::call`, ...) log these
//! and substitute a default; the `try_*` variants hand them back to the caller.

use thiserror::Error;

use tether_types::{PropertyKind, SignatureError};

#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// No module reachable from the catalog roots declares the delegate shape
    #[error("delegate type '{name}' not found (scanned: {})", .scanned.join(", "))]
    TypeResolution { name: String, scanned: Vec<String> },

    #[error("foreign call '{member}' on handle {handle} failed: {message}")]
    Invocation {
        handle: i32,
        member: String,
        message: String,
    },

    #[error("no member '{member}' on handle {handle}")]
    MissingMember { handle: i32, member: String },

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("cannot convert {value} to {kind}")]
    Conversion { kind: PropertyKind, value: String },

    #[error("expected {expected} argument(s), got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("delegate '{name}' takes {arity} parameters, at most {max} can be bound")]
    TooManyParameters { name: String, arity: usize, max: usize },

    #[error("no live foreign object for handle {0}")]
    NoObject(i32),

    #[error("foreign runtime error: {0}")]
    Foreign(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Wrap a runtime-reported failure with the member it happened in
    pub(crate) fn invocation(handle: i32, member: impl Into<String>, cause: &BridgeError) -> Self {
        match cause {
            // already carries its context
            BridgeError::Invocation { .. } => cause.clone(),
            other => BridgeError::Invocation {
                handle,
                member: member.into(),
                message: other.to_string(),
            },
        }
    }
}

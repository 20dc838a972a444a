//! Core error types for sigtrace-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! record decoding and contract consistency failures.

use thiserror::Error;

use crate::id::MethodIdentity;

/// Core errors produced by the sigtrace-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The wire record is not valid JSON or does not have the record shape.
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    /// The wire record parsed but a required field is missing or blank.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// A contract failed its structural self-check.
    #[error("invalid contract: {reason}")]
    InvalidContract { reason: String },

    /// Two signatures for different methods were combined.
    #[error("cannot merge signature of {found} into {expected}")]
    IdentityMismatch {
        expected: MethodIdentity,
        found: MethodIdentity,
    },
}

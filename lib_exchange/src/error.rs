//! # Exchange Error Taxonomy
//!
//! Every fallible operation in the exchange core resolves to exactly one
//! `ExchangeError` kind. Ring store and rule failures are local to the
//! enqueue/dequeue that raised them; the socket forwards them unchanged to the
//! caller whose request failed.

use thiserror::Error;

use crate::core::rules::HookPhase;

/// Shorthand result type used across the crate.
pub type Result<T> = std::result::Result<T, ExchangeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("ring buffer is full")]
    BufferFull,

    #[error("ring buffer is empty")]
    BufferEmpty,

    #[error("key {key} is already buffered, overwrite is not allowed")]
    DuplicateKey { key: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("an exchange is already bound to this socket")]
    AlreadyBound,

    #[error("socket is closed")]
    Closed,

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("rule rejected the operation during {phase}: {reason}")]
    RuleRejected { phase: HookPhase, reason: String },

    #[error("failed to dispatch batch to the persistence writer: {0}")]
    PersistenceDispatchFailed(String),

    #[error("persistence writer failed: {0}")]
    Persistence(String),
}

impl ExchangeError {
    /// Short, stable name of the error kind. Used by the server front end when
    /// reporting failures over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeError::BufferFull => "BufferFull",
            ExchangeError::BufferEmpty => "BufferEmpty",
            ExchangeError::DuplicateKey { .. } => "DuplicateKey",
            ExchangeError::InvalidArgument(_) => "InvalidArgument",
            ExchangeError::NotFound(_) => "NotFound",
            ExchangeError::AlreadyBound => "AlreadyBound",
            ExchangeError::Closed => "Closed",
            ExchangeError::ResourceExhausted(_) => "ResourceExhausted",
            ExchangeError::RuleRejected { .. } => "RuleRejected",
            ExchangeError::PersistenceDispatchFailed(_) => "PersistenceDispatchFailed",
            ExchangeError::Persistence(_) => "Persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = ExchangeError::DuplicateKey { key: 42 };
        assert_eq!(err.to_string(), "key 42 is already buffered, overwrite is not allowed");

        let err = ExchangeError::RuleRejected {
            phase: HookPhase::PreEnqueue,
            reason: "quota".to_string(),
        };
        assert_eq!(err.to_string(), "rule rejected the operation during pre-enqueue: quota");
        assert_eq!(err.kind(), "RuleRejected");
    }
}

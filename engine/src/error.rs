//! Error taxonomy shared by ingestion and search.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed caller input: empty id, k of zero, unknown search method.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The ingestion queue is at capacity; retry with backoff.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// A search ran past its caller-supplied timeout.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

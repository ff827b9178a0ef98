//! Error types shared by the store, the advancement transaction and the controller.
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Failures raised by a durable participant store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call stalled for {0:?}")]
    Timeout(Duration),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors surfaced by hunt operations.
///
/// Expected business outcomes (mismatched or unreadable scans, missing
/// records during evaluation) are result variants elsewhere; only the
/// conditions below interrupt an operation.
#[derive(Debug, Error)]
pub enum HuntError {
    #[error("no authenticated identity")]
    NotAuthenticated,
    #[error("no participant record for this identity")]
    NoRecord,
    #[error("a participant record already exists for this identity")]
    AlreadyRegistered,
    #[error("the hunt has not been started")]
    NotStarted,
    #[error("out of sequence: level {asserted} asserted, expected {}", fmt_expected(.expected))]
    SequenceViolation { asserted: u32, expected: Option<u32> },
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn fmt_expected(expected: &Option<u32>) -> String {
    expected.map_or_else(|| "none (hunt completed)".to_string(), |lvl| lvl.to_string())
}

impl HuntError {
    /// Whether the caller may simply try the same operation again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

pub type HuntResult<T> = Result<T, HuntError>;

//! Engine error taxonomy. Contract errors (`InvalidIntervalKind`, `NotFound`,
//! `Validation`) fail a single unit of work and are never retried; transient
//! errors (`Unavailable`, `LockTimeout`) are retried per the dispatcher's
//! backoff policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown recurring interval: {0}")]
    InvalidIntervalKind(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a row lock")]
    LockTimeout,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Transient failures are worth retrying; everything else is terminal
    /// for the current unit of work.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Unavailable(_) | EngineError::LockTimeout)
    }
}

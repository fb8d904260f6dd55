//! Command-level error taxonomy.

use thiserror::Error;

use tally_core::DomainError;

use crate::event_store::EventStoreError;

/// Why a command was not applied.
///
/// Every variant means zero events were persisted. Only
/// [`CommandError::ConcurrencyConflict`] is worth retrying (reload and resubmit);
/// the rest need different input or different state.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error(
        "concurrency conflict on {aggregate_type} {aggregate_id}: loaded version {expected}, stored version {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: &'static str,
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    /// A stored payload no longer decodes into the aggregate's event type.
    #[error("failed to decode {aggregate_type} event #{sequence}: {message}")]
    Deserialize {
        aggregate_type: &'static str,
        sequence: u64,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl CommandError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommandError::ConcurrencyConflict { .. })
    }

    /// Attach the rejecting aggregate to a domain error.
    pub fn rejected(aggregate_type: &str, aggregate_id: impl core::fmt::Display, err: DomainError) -> Self {
        let context = format!("{aggregate_type} {aggregate_id}");
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                CommandError::Validation(format!("{context}: {msg}"))
            }
            DomainError::InvariantViolation(msg) => {
                CommandError::InvariantViolation(format!("{context}: {msg}"))
            }
            DomainError::NotFound(msg) => CommandError::NotFound(format!("{context}: {msg}")),
            DomainError::Conflict(msg) => CommandError::Conflict(format!("{context}: {msg}")),
            DomainError::Unauthorized => CommandError::Unauthorized,
        }
    }
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => CommandError::Validation(msg),
            DomainError::InvariantViolation(msg) => CommandError::InvariantViolation(msg),
            DomainError::NotFound(msg) => CommandError::NotFound(msg),
            DomainError::Conflict(msg) => CommandError::Conflict(msg),
            DomainError::Unauthorized => CommandError::Unauthorized,
        }
    }
}

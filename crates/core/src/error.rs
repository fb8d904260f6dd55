//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input the caller must correct (duplicate name, out-of-range number, unbalanced entry).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (cycle, frozen structure, posted entry).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced aggregate or entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The command conflicts with existing state (e.g. creating twice).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authentication or authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The rejection raised whenever a parent/child edge would create a cycle.
    pub fn invalid_parent() -> Self {
        Self::InvariantViolation("invalid parent".to_string())
    }
}

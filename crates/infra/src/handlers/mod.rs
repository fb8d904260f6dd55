//! Command handlers (application-level orchestration).
//!
//! ```text
//! command
//!   → read-side checks (directory) and cross-aggregate guards
//!   → load target aggregate(s) through the repository
//!   → execute (handle + apply, events staged)
//!   → save (optimistic concurrency) → record into the directory
//! ```
//!
//! A rejection at any step persists nothing. Handlers hold no state of their
//! own besides repositories and collaborators, and never retry.

use std::fmt::Display;

use crate::error::CommandError;

pub mod foundation;
pub mod gl;
pub mod hr;
pub mod payroll;
pub mod projects;

pub use foundation::{BusinessUnitHandler, LocationHandler, UserHandler};
pub use gl::{CalendarHandler, JournalHandler, LedgerHandler, NewLedger, StructureHandler};
pub use hr::PartyHandler;
pub use payroll::TimecardHandler;
pub use projects::ProjectHandler;

/// Log the outcome of one command and pass it through.
pub(crate) fn logged<T>(
    command: &'static str,
    aggregate_id: impl Display,
    result: Result<T, CommandError>,
) -> Result<T, CommandError> {
    match &result {
        Ok(_) => tracing::info!(command, aggregate_id = %aggregate_id, "command accepted"),
        Err(err) => tracing::warn!(
            command,
            aggregate_id = %aggregate_id,
            retryable = err.is_retryable(),
            error = %err,
            "command rejected"
        ),
    }
    result
}

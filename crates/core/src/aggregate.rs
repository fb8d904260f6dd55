//! Aggregate root traits for event-sourced domain models.

use uuid::Uuid;

use crate::error::DomainError;
use crate::id::AggregateId;

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + Into<Uuid>;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of events applied to this instance.
    ///
    /// A freshly rehydrated aggregate reports the length of its stream.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// Require the stream to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => actual == 0,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` validates every precondition and
///   returns the events describing the accepted change, or an error and no events.
/// - **State mutation**: `apply(&mut self, event)` evolves state. It only assigns
///   fields and must match every event variant.
///
/// Aggregates must not perform IO or side effects.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event (+1 version per event).
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// An aggregate whose state is stored as its own event stream.
///
/// Supplies what the repository needs to rebuild an instance: the stream type
/// recorded on every stored event and the zero-value state replay starts from.
pub trait EventSourced: Aggregate<Error = DomainError> {
    /// Stable stream type name (e.g. `"gl.journal_entry"`).
    const AGGREGATE_TYPE: &'static str;

    /// Not-yet-created instance used as the start of replay.
    fn empty(id: Self::Id) -> Self;

    /// Whether a creation event has been applied.
    fn is_created(&self) -> bool;

    fn stream_id(&self) -> AggregateId {
        AggregateId::from_uuid((*self.id()).into())
    }
}

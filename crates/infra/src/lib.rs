//! Infrastructure: the event store, the aggregate repository, the command
//! handlers that orchestrate aggregates, their read-side collaborators and
//! process configuration.
//!
//! Domain crates stay pure; everything that loads, saves or looks things up
//! lives here.

pub mod config;
pub mod directory;
pub mod error;
pub mod event_store;
pub mod handlers;
pub mod repository;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, Settings};
pub use directory::{
    BusinessUnitDirectory, CalendarDirectory, ElementDirectory, InMemoryDirectory, LocationUsage,
    PayrollDirectory, StructureDirectory, TimecardDirectory, UserDirectory,
};
pub use error::CommandError;
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
pub use repository::{AggregateRepository, Tracked};

//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id. The store knows nothing about domain
//! types: payloads are JSON values produced by `UncommittedEvent::from_typed`.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

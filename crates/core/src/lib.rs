//! `tally-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the aggregate contract, the error model, typed identifiers, effective dating
//! and the hierarchy guard shared by every parent/child relation.

pub mod aggregate;
pub mod effective;
pub mod error;
pub mod hierarchy;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, EventSourced, ExpectedVersion};
pub use effective::{DateEffective, EffectiveDateInterval, TimeSpan, minutes_to_hours};
pub use error::{DomainError, DomainResult};
pub use hierarchy::{HierarchyGuard, ParentMap};
pub use id::{AggregateId, IdGenerator, SequentialIdGenerator, UuidV7Generator};
pub use value_object::{CurrencyCode, ValueObject};

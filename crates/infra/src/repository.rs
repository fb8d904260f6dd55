//! Event-sourced aggregate repository.
//!
//! ```text
//! load(id)      stream → replay through apply → Tracked { version = len(stream) }
//! execute(cmd)  handle → apply → stage (nothing staged on rejection)
//! save/add      append staged events, expecting the version seen at load time
//! ```
//!
//! The repository performs no retries. A save that finds the stream moved on
//! fails with [`CommandError::ConcurrencyConflict`] and persists nothing; callers
//! reload and resubmit if they want to.

use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use tally_core::{AggregateId, AggregateRoot, EventSourced, ExpectedVersion, IdGenerator};
use tally_events::{Event, EventEnvelope};

use crate::error::CommandError;
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// An aggregate instance plus the bookkeeping needed to save it.
#[derive(Debug, Clone)]
pub struct Tracked<A: EventSourced> {
    aggregate: A,
    observed_version: u64,
    staged: Vec<A::Event>,
}

impl<A: EventSourced> Tracked<A> {
    /// A not-yet-persisted aggregate, to be created through `execute` + `add`.
    pub fn new(id: A::Id) -> Self {
        Self {
            aggregate: A::empty(id),
            observed_version: 0,
            staged: Vec::new(),
        }
    }

    pub fn aggregate(&self) -> &A {
        &self.aggregate
    }

    pub fn into_inner(self) -> A {
        self.aggregate
    }

    /// Stream version at load time (0 for new aggregates).
    pub fn observed_version(&self) -> u64 {
        self.observed_version
    }

    pub fn staged(&self) -> &[A::Event] {
        &self.staged
    }

    pub fn has_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Run a command against the in-memory state and stage its events.
    ///
    /// A rejected command stages nothing and leaves the state untouched.
    pub fn execute(&mut self, command: A::Command) -> Result<&[A::Event], CommandError> {
        let events = tally_events::execute(&mut self.aggregate, &command).map_err(|err| {
            CommandError::rejected(A::AGGREGATE_TYPE, self.aggregate.stream_id(), err)
        })?;
        let from = self.staged.len();
        self.staged.extend(events);
        Ok(&self.staged[from..])
    }
}

impl<A: EventSourced> Deref for Tracked<A> {
    type Target = A;

    fn deref(&self) -> &Self::Target {
        &self.aggregate
    }
}

/// Loads and saves one aggregate type over an [`EventStore`].
pub struct AggregateRepository<S, A> {
    store: S,
    ids: Arc<dyn IdGenerator>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<S: Clone, A> Clone for AggregateRepository<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ids: Arc::clone(&self.ids),
            _aggregate: PhantomData,
        }
    }
}

impl<S, A> AggregateRepository<S, A>
where
    S: EventStore,
    A: EventSourced,
    A::Event: Event + Serialize + DeserializeOwned,
{
    pub fn new(store: S, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            store,
            ids,
            _aggregate: PhantomData,
        }
    }

    /// Rebuild the aggregate by replaying its stream; `NotFound` if there is none.
    pub fn load(&self, id: A::Id) -> Result<Tracked<A>, CommandError> {
        self.try_load(id)?.ok_or_else(|| {
            CommandError::NotFound(format!("{} {}", A::AGGREGATE_TYPE, stream_of::<A>(id)))
        })
    }

    /// Like [`load`](Self::load), but an absent stream is `Ok(None)`.
    pub fn try_load(&self, id: A::Id) -> Result<Option<Tracked<A>>, CommandError> {
        let stream_id = stream_of::<A>(id);
        let history = self.store.load_stream(stream_id)?;
        if history.is_empty() {
            return Ok(None);
        }
        validate_loaded_stream::<A>(stream_id, &history)?;

        let mut aggregate = A::empty(id);
        for stored in &history {
            let event: A::Event = decode::<A>(stored)?;
            aggregate.apply(&event);
        }
        let observed_version = stream_version(&history);
        tracing::debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %stream_id,
            version = observed_version,
            "aggregate loaded"
        );

        Ok(Some(Tracked {
            aggregate,
            observed_version,
            staged: Vec::new(),
        }))
    }

    pub fn exists(&self, id: A::Id) -> Result<bool, CommandError> {
        Ok(!self.store.load_stream(stream_of::<A>(id))?.is_empty())
    }

    /// Persist a new aggregate; fails if its stream already exists.
    pub fn add(&self, tracked: &mut Tracked<A>) -> Result<Vec<StoredEvent>, CommandError> {
        if !tracked.has_changes() {
            return Err(CommandError::InvariantViolation(format!(
                "{} {} has no events to add",
                A::AGGREGATE_TYPE,
                tracked.stream_id()
            )));
        }
        if tracked.observed_version != 0 {
            return Err(CommandError::AlreadyExists(format!(
                "{} {}",
                A::AGGREGATE_TYPE,
                tracked.stream_id()
            )));
        }
        self.append(tracked, ExpectedVersion::NoStream)
    }

    /// Append staged events, conditioned on the version observed at load time.
    pub fn save(&self, tracked: &mut Tracked<A>) -> Result<Vec<StoredEvent>, CommandError> {
        if !tracked.has_changes() {
            return Ok(Vec::new());
        }
        let expected = ExpectedVersion::Exact(tracked.observed_version);
        self.append(tracked, expected)
    }

    /// Load, run one command, save. Returns the saved aggregate.
    pub fn dispatch(&self, id: A::Id, command: A::Command) -> Result<Tracked<A>, CommandError> {
        let mut tracked = self.load(id)?;
        tracked.execute(command)?;
        self.save(&mut tracked)?;
        Ok(tracked)
    }

    /// Create a new aggregate from its constructor command.
    pub fn create(&self, id: A::Id, command: A::Command) -> Result<Tracked<A>, CommandError> {
        let mut tracked = Tracked::<A>::new(id);
        tracked.execute(command)?;
        self.add(&mut tracked)?;
        Ok(tracked)
    }

    /// Decoded event history of one aggregate.
    pub fn history(&self, id: A::Id) -> Result<Vec<EventEnvelope<A::Event>>, CommandError> {
        let history = self.store.load_stream(stream_of::<A>(id))?;
        history
            .iter()
            .map(|stored| {
                stored.to_envelope().map_err(|e| CommandError::Deserialize {
                    aggregate_type: A::AGGREGATE_TYPE,
                    sequence: stored.sequence_number,
                    message: e.to_string(),
                })
            })
            .collect()
    }

    fn append(
        &self,
        tracked: &mut Tracked<A>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, CommandError> {
        let stream_id = tracked.stream_id();
        let uncommitted = tracked
            .staged
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    stream_id,
                    A::AGGREGATE_TYPE,
                    self.ids.next_uuid(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = match self.store.append(uncommitted, expected) {
            Ok(committed) => committed,
            Err(EventStoreError::Concurrency { actual, .. }) => {
                tracing::warn!(
                    aggregate_type = A::AGGREGATE_TYPE,
                    aggregate_id = %stream_id,
                    expected = tracked.observed_version,
                    actual,
                    "stale aggregate version"
                );
                return Err(match expected {
                    ExpectedVersion::NoStream => CommandError::AlreadyExists(format!(
                        "{} {}",
                        A::AGGREGATE_TYPE,
                        stream_id
                    )),
                    _ => CommandError::ConcurrencyConflict {
                        aggregate_type: A::AGGREGATE_TYPE,
                        aggregate_id: stream_id.to_string(),
                        expected: tracked.observed_version,
                        actual,
                    },
                });
            }
            Err(other) => return Err(other.into()),
        };

        tracked.observed_version = stream_version(&committed);
        tracked.staged.clear();
        tracing::debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %stream_id,
            events = committed.len(),
            version = tracked.observed_version,
            "aggregate saved"
        );
        Ok(committed)
    }
}

fn stream_of<A: AggregateRoot>(id: A::Id) -> AggregateId {
    let uuid: Uuid = id.into();
    AggregateId::from_uuid(uuid)
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn decode<A>(stored: &StoredEvent) -> Result<A::Event, CommandError>
where
    A: EventSourced,
    A::Event: DeserializeOwned,
{
    serde_json::from_value(stored.payload.clone()).map_err(|e| CommandError::Deserialize {
        aggregate_type: A::AGGREGATE_TYPE,
        sequence: stored.sequence_number,
        message: e.to_string(),
    })
}

fn validate_loaded_stream<A: EventSourced>(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), CommandError> {
    // Guard against a backend handing back a foreign or reordered stream.
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))
            .into());
        }
        if e.aggregate_type != A::AGGREGATE_TYPE {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} holds '{}', expected '{}'",
                e.aggregate_type,
                A::AGGREGATE_TYPE
            ))
            .into());
        }
        let expected_sequence = idx as u64 + 1;
        if e.sequence_number != expected_sequence {
            return Err(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (expected {expected_sequence}, found {})",
                e.sequence_number
            ))
            .into());
        }
    }
    Ok(())
}

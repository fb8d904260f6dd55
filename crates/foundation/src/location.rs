use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, DomainError, EventSourced};
use tally_events::Event;

use crate::business_unit::BusinessUnitId;

tally_core::uuid_id!(
    /// Location identifier (aggregate id).
    pub LocationId
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street1: Option<String>,
    pub street2: Option<String>,
    pub street3: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
}

/// Aggregate root: Location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    id: LocationId,
    name: String,
    business_unit_id: Option<BusinessUnitId>,
    description: Option<String>,
    inactive_date: Option<NaiveDate>,
    address: Address,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Location {
    pub fn empty(id: LocationId) -> Self {
        Self {
            id,
            name: String::new(),
            business_unit_id: None,
            description: None,
            inactive_date: None,
            address: Address::default(),
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn business_unit_id(&self) -> Option<BusinessUnitId> {
        self.business_unit_id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn inactive_date(&self) -> Option<NaiveDate> {
        self.inactive_date
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Active on `date` unless an inactive date on or before it is set.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        !self.deleted && self.inactive_date.is_none_or(|inactive| date < inactive)
    }
}

impl AggregateRoot for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateLocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLocation {
    pub location_id: LocationId,
    pub name: String,
    pub business_unit_id: Option<BusinessUnitId>,
    pub description: Option<String>,
    pub inactive_date: Option<NaiveDate>,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLocation {
    pub location_id: LocationId,
    pub description: Option<String>,
    pub inactive_date: Option<NaiveDate>,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DisableLocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableLocation {
    pub location_id: LocationId,
    pub inactive_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteLocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteLocation {
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationCommand {
    Create(CreateLocation),
    Update(UpdateLocation),
    Disable(DisableLocation),
    Delete(DeleteLocation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCreated {
    pub location_id: LocationId,
    pub name: String,
    pub business_unit_id: Option<BusinessUnitId>,
    pub description: Option<String>,
    pub inactive_date: Option<NaiveDate>,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationUpdated {
    pub location_id: LocationId,
    pub description: Option<String>,
    pub inactive_date: Option<NaiveDate>,
    pub address: Address,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDisabled {
    pub location_id: LocationId,
    pub inactive_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDeleted {
    pub location_id: LocationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationEvent {
    Created(LocationCreated),
    Updated(LocationUpdated),
    Disabled(LocationDisabled),
    Deleted(LocationDeleted),
}

impl Event for LocationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LocationEvent::Created(_) => "foundation.location.created",
            LocationEvent::Updated(_) => "foundation.location.updated",
            LocationEvent::Disabled(_) => "foundation.location.disabled",
            LocationEvent::Deleted(_) => "foundation.location.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LocationEvent::Created(e) => e.occurred_at,
            LocationEvent::Updated(e) => e.occurred_at,
            LocationEvent::Disabled(e) => e.occurred_at,
            LocationEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Location {
    type Command = LocationCommand;
    type Event = LocationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LocationEvent::Created(e) => {
                self.id = e.location_id;
                self.name = e.name.clone();
                self.business_unit_id = e.business_unit_id;
                self.description = e.description.clone();
                self.inactive_date = e.inactive_date;
                self.address = e.address.clone();
                self.created = true;
            }
            LocationEvent::Updated(e) => {
                self.description = e.description.clone();
                self.inactive_date = e.inactive_date;
                self.address = e.address.clone();
            }
            LocationEvent::Disabled(e) => {
                self.inactive_date = Some(e.inactive_date);
            }
            LocationEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LocationCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("location already exists"));
                }
                if self.id != cmd.location_id {
                    return Err(DomainError::invariant("location_id mismatch"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("location name cannot be empty"));
                }
                validate_inactive_date(cmd.inactive_date, cmd.occurred_at)?;

                Ok(vec![LocationEvent::Created(LocationCreated {
                    location_id: cmd.location_id,
                    name: cmd.name.trim().to_string(),
                    business_unit_id: cmd.business_unit_id,
                    description: cmd.description.clone(),
                    inactive_date: cmd.inactive_date,
                    address: cmd.address.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            LocationCommand::Update(cmd) => {
                self.ensure_live()?;
                validate_inactive_date(cmd.inactive_date, cmd.occurred_at)?;
                Ok(vec![LocationEvent::Updated(LocationUpdated {
                    location_id: cmd.location_id,
                    description: cmd.description.clone(),
                    inactive_date: cmd.inactive_date,
                    address: cmd.address.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            LocationCommand::Disable(cmd) => {
                self.ensure_live()?;
                validate_inactive_date(Some(cmd.inactive_date), cmd.occurred_at)?;
                Ok(vec![LocationEvent::Disabled(LocationDisabled {
                    location_id: cmd.location_id,
                    inactive_date: cmd.inactive_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            LocationCommand::Delete(cmd) => {
                self.ensure_live()?;
                Ok(vec![LocationEvent::Deleted(LocationDeleted {
                    location_id: cmd.location_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for Location {
    const AGGREGATE_TYPE: &'static str = "foundation.location";

    fn empty(id: LocationId) -> Self {
        Location::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

impl Location {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("location {}", self.id)));
        }
        if self.deleted {
            return Err(DomainError::invariant("location is deleted"));
        }
        Ok(())
    }
}

/// "Today" is the date the command was issued.
fn validate_inactive_date(inactive: Option<NaiveDate>, at: DateTime<Utc>) -> Result<(), DomainError> {
    match inactive {
        Some(date) if date < at.date_naive() => Err(DomainError::validation(
            "inactive date cannot be in the past",
        )),
        _ => Ok(()),
    }
}

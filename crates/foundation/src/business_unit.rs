use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, CurrencyCode, DomainError, EventSourced};
use tally_events::Event;

use crate::location::LocationId;

tally_core::uuid_id!(
    /// Business unit identifier (aggregate id).
    pub BusinessUnitId
);

/// Aggregate root: BusinessUnit (node of the organisational tree).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessUnit {
    id: BusinessUnitId,
    parent_id: Option<BusinessUnitId>,
    location_id: Option<LocationId>,
    name: String,
    base_currency: Option<CurrencyCode>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl BusinessUnit {
    pub fn empty(id: BusinessUnitId) -> Self {
        Self {
            id,
            parent_id: None,
            location_id: None,
            name: String::new(),
            base_currency: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn parent_id(&self) -> Option<BusinessUnitId> {
        self.parent_id
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.location_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own currency, or the one inherited from the parent at creation/update.
    pub fn base_currency(&self) -> Option<&CurrencyCode> {
        self.base_currency.as_ref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for BusinessUnit {
    type Id = BusinessUnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBusinessUnit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBusinessUnit {
    pub business_unit_id: BusinessUnitId,
    pub parent_id: Option<BusinessUnitId>,
    pub location_id: Option<LocationId>,
    pub name: String,
    pub base_currency: Option<CurrencyCode>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateBusinessUnit (full replacement of the mutable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBusinessUnit {
    pub business_unit_id: BusinessUnitId,
    pub parent_id: Option<BusinessUnitId>,
    pub location_id: Option<LocationId>,
    pub name: String,
    pub base_currency: Option<CurrencyCode>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteBusinessUnit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBusinessUnit {
    pub business_unit_id: BusinessUnitId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessUnitCommand {
    Create(CreateBusinessUnit),
    Update(UpdateBusinessUnit),
    Delete(DeleteBusinessUnit),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessUnitCreated {
    pub business_unit_id: BusinessUnitId,
    pub parent_id: Option<BusinessUnitId>,
    pub location_id: Option<LocationId>,
    pub name: String,
    pub base_currency: Option<CurrencyCode>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessUnitUpdated {
    pub business_unit_id: BusinessUnitId,
    pub parent_id: Option<BusinessUnitId>,
    pub location_id: Option<LocationId>,
    pub name: String,
    pub base_currency: Option<CurrencyCode>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessUnitDeleted {
    pub business_unit_id: BusinessUnitId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessUnitEvent {
    Created(BusinessUnitCreated),
    Updated(BusinessUnitUpdated),
    Deleted(BusinessUnitDeleted),
}

impl Event for BusinessUnitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BusinessUnitEvent::Created(_) => "foundation.business_unit.created",
            BusinessUnitEvent::Updated(_) => "foundation.business_unit.updated",
            BusinessUnitEvent::Deleted(_) => "foundation.business_unit.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BusinessUnitEvent::Created(e) => e.occurred_at,
            BusinessUnitEvent::Updated(e) => e.occurred_at,
            BusinessUnitEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BusinessUnit {
    type Command = BusinessUnitCommand;
    type Event = BusinessUnitEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BusinessUnitEvent::Created(e) => {
                self.id = e.business_unit_id;
                self.parent_id = e.parent_id;
                self.location_id = e.location_id;
                self.name = e.name.clone();
                self.base_currency = e.base_currency.clone();
                self.created = true;
            }
            BusinessUnitEvent::Updated(e) => {
                self.parent_id = e.parent_id;
                self.location_id = e.location_id;
                self.name = e.name.clone();
                self.base_currency = e.base_currency.clone();
            }
            BusinessUnitEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BusinessUnitCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("business unit already exists"));
                }
                if self.id != cmd.business_unit_id {
                    return Err(DomainError::invariant("business_unit_id mismatch"));
                }
                if cmd.parent_id == Some(cmd.business_unit_id) {
                    return Err(DomainError::invalid_parent());
                }
                let name = validate_name(&cmd.name)?;

                Ok(vec![BusinessUnitEvent::Created(BusinessUnitCreated {
                    business_unit_id: cmd.business_unit_id,
                    parent_id: cmd.parent_id,
                    location_id: cmd.location_id,
                    name,
                    base_currency: cmd.base_currency.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            BusinessUnitCommand::Update(cmd) => {
                self.ensure_live()?;
                if cmd.parent_id == Some(self.id) {
                    return Err(DomainError::invalid_parent());
                }
                let name = validate_name(&cmd.name)?;

                Ok(vec![BusinessUnitEvent::Updated(BusinessUnitUpdated {
                    business_unit_id: cmd.business_unit_id,
                    parent_id: cmd.parent_id,
                    location_id: cmd.location_id,
                    name,
                    base_currency: cmd.base_currency.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            BusinessUnitCommand::Delete(cmd) => {
                self.ensure_live()?;
                Ok(vec![BusinessUnitEvent::Deleted(BusinessUnitDeleted {
                    business_unit_id: cmd.business_unit_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for BusinessUnit {
    const AGGREGATE_TYPE: &'static str = "foundation.business_unit";

    fn empty(id: BusinessUnitId) -> Self {
        BusinessUnit::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

impl BusinessUnit {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("business unit {}", self.id)));
        }
        if self.deleted {
            return Err(DomainError::invariant("business unit is deleted"));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String, DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("business unit name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

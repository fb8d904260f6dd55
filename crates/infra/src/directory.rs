//! Read-side collaborators consulted by the command handlers.
//!
//! Rules that span many aggregates (sibling name uniqueness, "still
//! referenced" checks, lookups by natural key) are answered here rather than
//! by loading every stream. Handlers record into the directory after a
//! successful save, so the directory never runs ahead of the event store.
//!
//! [`InMemoryDirectory`] implements every trait over one lock and is the
//! shipped implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;

use tally_core::{AggregateRoot, DateEffective};
use tally_foundation::{BusinessUnit, BusinessUnitId, LocationId, UserId};
use tally_gl::{CalendarId, StructureId};
use tally_hr::PartyId;
use tally_payroll::{ElementLink, ElementType, ElementTypeId, Payroll, PayrollId, TimecardId};

use crate::error::CommandError;
use crate::event_store::EventStoreError;

pub trait BusinessUnitDirectory: Send + Sync {
    /// Whether no other live unit under `parent` is called `name`.
    fn unique_name(
        &self,
        parent: Option<BusinessUnitId>,
        unit: BusinessUnitId,
        name: &str,
    ) -> Result<bool, CommandError>;

    fn has_children(&self, unit: BusinessUnitId) -> Result<bool, CommandError>;

    fn record_business_unit(&self, unit: &BusinessUnit) -> Result<(), CommandError>;
}

pub trait LocationUsage: Send + Sync {
    /// Whether a live business unit or a position references the location.
    fn location_in_use(&self, location: LocationId) -> Result<bool, CommandError>;

    fn record_position_location(
        &self,
        position: PartyId,
        location: Option<LocationId>,
    ) -> Result<(), CommandError>;
}

pub trait UserDirectory: Send + Sync {
    fn user_by_username(&self, username: &str) -> Result<Option<UserId>, CommandError>;

    fn record_username(&self, username: &str, user: UserId) -> Result<(), CommandError>;
}

pub trait CalendarDirectory: Send + Sync {
    fn calendar_named(&self, name: &str) -> Result<Option<CalendarId>, CommandError>;

    fn record_calendar(&self, name: &str, calendar: CalendarId) -> Result<(), CommandError>;
}

pub trait StructureDirectory: Send + Sync {
    fn structure_named(&self, name: &str) -> Result<Option<StructureId>, CommandError>;

    fn record_structure(&self, name: &str, structure: StructureId) -> Result<(), CommandError>;
}

pub trait PayrollDirectory: Send + Sync {
    fn payroll(&self, payroll: PayrollId) -> Result<Option<Payroll>, CommandError>;
}

pub trait ElementDirectory: Send + Sync {
    /// Element types linked to `position` and effective on `date`, in link order.
    fn elements_for(&self, position: PartyId, date: NaiveDate) -> Result<Vec<ElementType>, CommandError>;
}

pub trait TimecardDirectory: Send + Sync {
    /// The position's timecard for the cycle starting on `cycle_start`.
    fn timecard_for(
        &self,
        position: PartyId,
        cycle_start: NaiveDate,
    ) -> Result<Option<TimecardId>, CommandError>;

    fn record_timecard(
        &self,
        position: PartyId,
        cycle_start: NaiveDate,
        timecard: TimecardId,
    ) -> Result<(), CommandError>;
}

#[derive(Debug, Clone)]
struct UnitEntry {
    parent: Option<BusinessUnitId>,
    name: String,
    location: Option<LocationId>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    units: HashMap<BusinessUnitId, UnitEntry>,
    position_locations: HashMap<PartyId, LocationId>,
    usernames: HashMap<String, UserId>,
    calendars: HashMap<String, CalendarId>,
    structures: HashMap<String, StructureId>,
    payrolls: HashMap<PayrollId, Payroll>,
    elements: HashMap<ElementTypeId, ElementType>,
    links: Vec<ElementLink>,
    timecards: HashMap<(PartyId, NaiveDate), TimecardId>,
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<State>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn register_payroll(&self, payroll: Payroll) -> Result<(), CommandError> {
        self.write(|s| {
            s.payrolls.insert(payroll.id, payroll);
        })
    }

    pub fn register_element(&self, element: ElementType) -> Result<(), CommandError> {
        self.write(|s| {
            s.elements.insert(element.id, element);
        })
    }

    /// Attach an already registered element type to a position.
    pub fn link_element(&self, link: ElementLink) -> Result<(), CommandError> {
        self.write(|s| {
            if !s.elements.contains_key(&link.element_type_id) {
                return Err(CommandError::NotFound(format!(
                    "element type {}",
                    link.element_type_id
                )));
            }
            s.links.push(link);
            Ok(())
        })?
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, CommandError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(f(&state))
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, CommandError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        Ok(f(&mut state))
    }
}

fn poisoned() -> CommandError {
    EventStoreError::Unavailable("directory lock poisoned".to_string()).into()
}

impl BusinessUnitDirectory for InMemoryDirectory {
    fn unique_name(
        &self,
        parent: Option<BusinessUnitId>,
        unit: BusinessUnitId,
        name: &str,
    ) -> Result<bool, CommandError> {
        let name = name.trim();
        self.read(|s| {
            !s.units.iter().any(|(id, e)| {
                *id != unit && !e.deleted && e.parent == parent && e.name.eq_ignore_ascii_case(name)
            })
        })
    }

    fn has_children(&self, unit: BusinessUnitId) -> Result<bool, CommandError> {
        self.read(|s| s.units.values().any(|e| !e.deleted && e.parent == Some(unit)))
    }

    fn record_business_unit(&self, unit: &BusinessUnit) -> Result<(), CommandError> {
        let entry = UnitEntry {
            parent: unit.parent_id(),
            name: unit.name().to_string(),
            location: unit.location_id(),
            deleted: unit.is_deleted(),
        };
        self.write(|s| {
            s.units.insert(*unit.id(), entry);
        })
    }
}

impl LocationUsage for InMemoryDirectory {
    fn location_in_use(&self, location: LocationId) -> Result<bool, CommandError> {
        self.read(|s| {
            s.units
                .values()
                .any(|e| !e.deleted && e.location == Some(location))
                || s.position_locations.values().any(|l| *l == location)
        })
    }

    fn record_position_location(
        &self,
        position: PartyId,
        location: Option<LocationId>,
    ) -> Result<(), CommandError> {
        self.write(|s| match location {
            Some(location) => {
                s.position_locations.insert(position, location);
            }
            None => {
                s.position_locations.remove(&position);
            }
        })
    }
}

impl UserDirectory for InMemoryDirectory {
    fn user_by_username(&self, username: &str) -> Result<Option<UserId>, CommandError> {
        self.read(|s| s.usernames.get(username).copied())
    }

    fn record_username(&self, username: &str, user: UserId) -> Result<(), CommandError> {
        self.write(|s| {
            s.usernames.insert(username.to_string(), user);
        })
    }
}

impl CalendarDirectory for InMemoryDirectory {
    fn calendar_named(&self, name: &str) -> Result<Option<CalendarId>, CommandError> {
        self.read(|s| s.calendars.get(name.trim()).copied())
    }

    fn record_calendar(&self, name: &str, calendar: CalendarId) -> Result<(), CommandError> {
        self.write(|s| {
            s.calendars.insert(name.trim().to_string(), calendar);
        })
    }
}

impl StructureDirectory for InMemoryDirectory {
    fn structure_named(&self, name: &str) -> Result<Option<StructureId>, CommandError> {
        self.read(|s| s.structures.get(name.trim()).copied())
    }

    fn record_structure(&self, name: &str, structure: StructureId) -> Result<(), CommandError> {
        self.write(|s| {
            s.structures.insert(name.trim().to_string(), structure);
        })
    }
}

impl PayrollDirectory for InMemoryDirectory {
    fn payroll(&self, payroll: PayrollId) -> Result<Option<Payroll>, CommandError> {
        self.read(|s| s.payrolls.get(&payroll).cloned())
    }
}

impl ElementDirectory for InMemoryDirectory {
    fn elements_for(&self, position: PartyId, date: NaiveDate) -> Result<Vec<ElementType>, CommandError> {
        self.read(|s| {
            s.links
                .iter()
                .filter(|link| link.position_id == position && link.is_effective(date))
                .filter_map(|link| s.elements.get(&link.element_type_id))
                .filter(|element| element.effective.is_effective(date))
                .cloned()
                .collect()
        })
    }
}

impl TimecardDirectory for InMemoryDirectory {
    fn timecard_for(
        &self,
        position: PartyId,
        cycle_start: NaiveDate,
    ) -> Result<Option<TimecardId>, CommandError> {
        self.read(|s| s.timecards.get(&(position, cycle_start)).copied())
    }

    fn record_timecard(
        &self,
        position: PartyId,
        cycle_start: NaiveDate,
        timecard: TimecardId,
    ) -> Result<(), CommandError> {
        self.write(|s| {
            s.timecards.insert((position, cycle_start), timecard);
        })
    }
}

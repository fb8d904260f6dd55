use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use tally_core::{
    Aggregate, AggregateRoot, DateEffective, DomainError, EffectiveDateInterval, EventSourced,
};
use tally_events::Event;
use tally_foundation::LocationId;

tally_core::uuid_id!(
    /// Party identifier (aggregate id).
    pub PartyId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Organization,
    Job,
    Position,
    Person,
}

/// Relation kind of an accountability edge. Cycles are checked per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountabilityKind {
    /// Position reports to position, organization rolls up to organization.
    ReportingLine,
    /// Person fills a position.
    PositionAssignment,
    /// Position is classified under a job.
    JobClassification,
    /// Position or organization belongs to an organization.
    OrganizationMembership,
}

impl AccountabilityKind {
    /// Whether an edge of this kind may link a `parent` kind to a `child` kind.
    pub fn allows(self, parent: PartyKind, child: PartyKind) -> bool {
        use PartyKind::*;
        match self {
            AccountabilityKind::ReportingLine => {
                matches!((parent, child), (Position, Position) | (Organization, Organization))
            }
            AccountabilityKind::PositionAssignment => matches!((parent, child), (Position, Person)),
            AccountabilityKind::JobClassification => matches!((parent, child), (Job, Position)),
            AccountabilityKind::OrganizationMembership => {
                matches!((parent, child), (Organization, Position) | (Organization, Organization))
            }
        }
    }
}

/// A parent edge, recorded on the child party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accountability {
    pub parent_id: PartyId,
    pub kind: AccountabilityKind,
    pub effective: EffectiveDateInterval,
}

impl DateEffective for Accountability {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    Single,
    Shared,
}

/// Scheduling constraints that drive hour apportionment on a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRules {
    pub normal_start: NaiveTime,
    pub normal_end: NaiveTime,
    /// Standard hours per working day.
    pub working_hours: Decimal,
    /// Minimum paid hours per call.
    pub minimum_call: Decimal,
    /// Regular hours per timecard before overtime; zero means no cap.
    pub maximum_hours: Decimal,
    /// Weekend work is paid as overtime.
    pub weekend_overtime: bool,
}

impl WorkRules {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.normal_end <= self.normal_start {
            return Err(DomainError::validation("normal end must be after normal start"));
        }
        for (label, value) in [
            ("working hours", self.working_hours),
            ("minimum call", self.minimum_call),
            ("maximum hours", self.maximum_hours),
        ] {
            if value.is_sign_negative() {
                return Err(DomainError::validation(format!("{label} cannot be negative")));
            }
        }
        Ok(())
    }

    pub fn minimum_call_duration(&self) -> Duration {
        hours_to_duration(self.minimum_call)
    }

    pub fn maximum_hours_duration(&self) -> Duration {
        hours_to_duration(self.maximum_hours)
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

/// Whole minutes, rounded.
fn hours_to_duration(hours: Decimal) -> Duration {
    let minutes = (hours * Decimal::from(60)).round().to_i64().unwrap_or(0);
    Duration::minutes(minutes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDetails {
    pub position_type: PositionType,
    pub max_persons: u32,
    pub location_id: Option<LocationId>,
    pub work_rules: WorkRules,
}

impl PositionDetails {
    fn validate(&self) -> Result<(), DomainError> {
        if self.position_type == PositionType::Single && self.max_persons != 1 {
            return Err(DomainError::validation("max persons must equal 1"));
        }
        if self.max_persons == 0 {
            return Err(DomainError::validation("max persons must be at least 1"));
        }
        self.work_rules.validate()
    }
}

/// Aggregate root: Party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    id: PartyId,
    kind: PartyKind,
    name: String,
    effective: EffectiveDateInterval,
    position: Option<PositionDetails>,
    parents: Vec<Accountability>,
    version: u64,
    created: bool,
}

impl Party {
    pub fn empty(id: PartyId) -> Self {
        Self {
            id,
            kind: PartyKind::Person,
            name: String::new(),
            effective: EffectiveDateInterval::ALWAYS,
            position: None,
            parents: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position details; `None` for every other kind.
    pub fn position(&self) -> Option<&PositionDetails> {
        self.position.as_ref()
    }

    pub fn work_rules(&self) -> Option<&WorkRules> {
        self.position.as_ref().map(|p| &p.work_rules)
    }

    pub fn accountabilities(&self) -> &[Accountability] {
        &self.parents
    }

    /// Every recorded parent of `kind`, regardless of dates.
    pub fn parents(&self, kind: AccountabilityKind) -> Vec<PartyId> {
        self.parents
            .iter()
            .filter(|a| a.kind == kind)
            .map(|a| a.parent_id)
            .collect()
    }

    /// Parents of `kind` in force on `date`.
    pub fn parents_on(&self, kind: AccountabilityKind, date: NaiveDate) -> Vec<PartyId> {
        self.parents
            .iter()
            .filter(|a| a.kind == kind && a.is_effective(date))
            .map(|a| a.parent_id)
            .collect()
    }
}

impl DateEffective for Party {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}

impl AggregateRoot for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterParty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterParty {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub effective: EffectiveDateInterval,
    /// Required for positions, rejected for other kinds.
    pub position: Option<PositionDetails>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateWorkRules (positions only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWorkRules {
    pub party_id: PartyId,
    pub work_rules: WorkRules,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddAccountability (edge from `parent_id` down to this party).
///
/// The handler loads the parent to supply `parent_kind` and to walk the
/// existing edges for cycles before dispatching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAccountability {
    pub party_id: PartyId,
    pub parent_id: PartyId,
    pub parent_kind: PartyKind,
    pub kind: AccountabilityKind,
    pub effective: EffectiveDateInterval,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EndAccountability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndAccountability {
    pub party_id: PartyId,
    pub parent_id: PartyId,
    pub kind: AccountabilityKind,
    /// Last day the edge is in force.
    pub end_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyCommand {
    Register(RegisterParty),
    UpdateWorkRules(UpdateWorkRules),
    AddAccountability(AddAccountability),
    EndAccountability(EndAccountability),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRegistered {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub effective: EffectiveDateInterval,
    pub position: Option<PositionDetails>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRulesUpdated {
    pub party_id: PartyId,
    pub work_rules: WorkRules,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountabilityAdded {
    pub party_id: PartyId,
    pub accountability: Accountability,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountabilityEnded {
    pub party_id: PartyId,
    pub parent_id: PartyId,
    pub kind: AccountabilityKind,
    pub effective: EffectiveDateInterval,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyEvent {
    Registered(PartyRegistered),
    WorkRulesUpdated(WorkRulesUpdated),
    AccountabilityAdded(AccountabilityAdded),
    AccountabilityEnded(AccountabilityEnded),
}

impl Event for PartyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PartyEvent::Registered(_) => "hr.party.registered",
            PartyEvent::WorkRulesUpdated(_) => "hr.party.work_rules_updated",
            PartyEvent::AccountabilityAdded(_) => "hr.party.accountability_added",
            PartyEvent::AccountabilityEnded(_) => "hr.party.accountability_ended",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PartyEvent::Registered(e) => e.occurred_at,
            PartyEvent::WorkRulesUpdated(e) => e.occurred_at,
            PartyEvent::AccountabilityAdded(e) => e.occurred_at,
            PartyEvent::AccountabilityEnded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Party {
    type Command = PartyCommand;
    type Event = PartyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PartyEvent::Registered(e) => {
                self.id = e.party_id;
                self.kind = e.kind;
                self.name = e.name.clone();
                self.effective = e.effective;
                self.position = e.position.clone();
                self.created = true;
            }
            PartyEvent::WorkRulesUpdated(e) => {
                if let Some(position) = self.position.as_mut() {
                    position.work_rules = e.work_rules.clone();
                }
            }
            PartyEvent::AccountabilityAdded(e) => {
                self.parents.push(e.accountability.clone());
            }
            PartyEvent::AccountabilityEnded(e) => {
                if let Some(edge) = self
                    .parents
                    .iter_mut()
                    .find(|a| a.parent_id == e.parent_id && a.kind == e.kind)
                {
                    edge.effective = e.effective;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PartyCommand::Register(cmd) => self.handle_register(cmd),
            PartyCommand::UpdateWorkRules(cmd) => {
                self.ensure_created()?;
                if self.position.is_none() {
                    return Err(DomainError::validation("only positions carry work rules"));
                }
                cmd.work_rules.validate()?;
                Ok(vec![PartyEvent::WorkRulesUpdated(WorkRulesUpdated {
                    party_id: cmd.party_id,
                    work_rules: cmd.work_rules.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            PartyCommand::AddAccountability(cmd) => self.handle_add_accountability(cmd),
            PartyCommand::EndAccountability(cmd) => {
                self.ensure_created()?;
                let edge = self
                    .parents
                    .iter()
                    .find(|a| a.parent_id == cmd.parent_id && a.kind == cmd.kind)
                    .ok_or_else(|| {
                        DomainError::not_found(format!(
                            "{:?} accountability to {}",
                            cmd.kind, cmd.parent_id
                        ))
                    })?;
                let effective = EffectiveDateInterval::from_dates(
                    edge.effective.start_date(),
                    Some(cmd.end_date),
                )?;
                Ok(vec![PartyEvent::AccountabilityEnded(AccountabilityEnded {
                    party_id: cmd.party_id,
                    parent_id: cmd.parent_id,
                    kind: cmd.kind,
                    effective,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for Party {
    const AGGREGATE_TYPE: &'static str = "hr.party";

    fn empty(id: PartyId) -> Self {
        Party::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

impl Party {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("party {}", self.id)));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterParty) -> Result<Vec<PartyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("party already exists"));
        }
        if self.id != cmd.party_id {
            return Err(DomainError::invariant("party_id mismatch"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("party name cannot be empty"));
        }
        match (cmd.kind, &cmd.position) {
            (PartyKind::Position, Some(position)) => position.validate()?,
            (PartyKind::Position, None) => {
                return Err(DomainError::validation("positions need position details"));
            }
            (_, Some(_)) => {
                return Err(DomainError::validation("only positions carry position details"));
            }
            (_, None) => {}
        }

        Ok(vec![PartyEvent::Registered(PartyRegistered {
            party_id: cmd.party_id,
            kind: cmd.kind,
            name: cmd.name.trim().to_string(),
            effective: cmd.effective,
            position: cmd.position.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_accountability(&self, cmd: &AddAccountability) -> Result<Vec<PartyEvent>, DomainError> {
        self.ensure_created()?;
        if cmd.parent_id == self.id {
            return Err(DomainError::invalid_parent());
        }
        if !cmd.kind.allows(cmd.parent_kind, self.kind) {
            return Err(DomainError::validation(format!(
                "{:?} cannot link a {:?} to a {:?}",
                cmd.kind, cmd.parent_kind, self.kind
            )));
        }
        if self
            .parents
            .iter()
            .any(|a| a.parent_id == cmd.parent_id && a.kind == cmd.kind)
        {
            return Err(DomainError::conflict("accountability already exists"));
        }

        Ok(vec![PartyEvent::AccountabilityAdded(AccountabilityAdded {
            party_id: cmd.party_id,
            accountability: Accountability {
                parent_id: cmd.parent_id,
                kind: cmd.kind,
                effective: cmd.effective,
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}

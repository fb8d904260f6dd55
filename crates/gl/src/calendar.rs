use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, DomainError, EventSourced};
use tally_events::Event;

use crate::calendar_validator::CalendarValidator;

tally_core::uuid_id!(
    /// Calendar identifier (aggregate id).
    pub CalendarId
);
tally_core::uuid_id!(pub PeriodId);

/// Length of an accounting period, which bounds the period numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Quarter,
    Month,
    MonthWithAdjustment,
    FourWeek,
    BiWeek,
}

impl PeriodType {
    /// Highest valid period number.
    pub fn period_count(self) -> u32 {
        match self {
            PeriodType::Quarter => 4,
            PeriodType::Month => 12,
            PeriodType::MonthWithAdjustment => 13,
            PeriodType::FourWeek => 13,
            PeriodType::BiWeek => 26,
        }
    }

    pub fn meaning(self) -> &'static str {
        match self {
            PeriodType::Quarter => "Quarter",
            PeriodType::Month => "Month",
            PeriodType::MonthWithAdjustment => "Adjusting Month",
            PeriodType::FourWeek => "13 Periods",
            PeriodType::BiWeek => "26 Periods",
        }
    }
}

/// A period as proposed on calendar creation (before the year start is known).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDraft {
    pub period_id: PeriodId,
    pub name: String,
    pub description: Option<String>,
    pub start: NaiveDate,
    /// Inclusive last day.
    pub end: NaiveDate,
    pub period_type: PeriodType,
    pub period_year: i32,
    pub period_num: u32,
    /// Adjustment periods are exempt from the overlap and gap rules.
    pub adjustment: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub period_id: PeriodId,
    pub name: String,
    pub description: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub year_start: NaiveDate,
    pub period_type: PeriodType,
    pub period_year: i32,
    pub period_num: u32,
    pub adjustment: bool,
}

impl Period {
    fn from_draft(draft: &PeriodDraft, year_start: NaiveDate) -> Self {
        Self {
            period_id: draft.period_id,
            name: draft.name.clone(),
            description: draft.description.clone(),
            start: draft.start,
            end: draft.end,
            year_start,
            period_type: draft.period_type,
            period_year: draft.period_year,
            period_num: draft.period_num,
            adjustment: draft.adjustment,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Aggregate root: Calendar (set of accounting periods).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calendar {
    id: CalendarId,
    name: String,
    description: Option<String>,
    /// Ordered by period number.
    periods: Vec<Period>,
    version: u64,
    created: bool,
}

impl Calendar {
    pub fn empty(id: CalendarId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            periods: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn periods(&self) -> &[Period] {
        &self.periods
    }

    pub fn period(&self, id: PeriodId) -> Option<&Period> {
        self.periods.iter().find(|p| p.period_id == id)
    }

    /// The regular (non-adjustment) period containing `date`.
    pub fn period_for(&self, date: NaiveDate) -> Option<&Period> {
        self.periods.iter().find(|p| !p.adjustment && p.contains(date))
    }
}

impl AggregateRoot for Calendar {
    type Id = CalendarId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateCalendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCalendar {
    pub calendar_id: CalendarId,
    pub name: String,
    pub description: Option<String>,
    pub periods: Vec<PeriodDraft>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarCommand {
    Create(CreateCalendar),
}

/// Event: CalendarCreated. Periods carry the stamped year start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarCreated {
    pub calendar_id: CalendarId,
    pub name: String,
    pub description: Option<String>,
    pub periods: Vec<Period>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarEvent {
    Created(CalendarCreated),
}

impl Event for CalendarEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CalendarEvent::Created(_) => "gl.calendar.created",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CalendarEvent::Created(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Calendar {
    type Command = CalendarCommand;
    type Event = CalendarEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CalendarEvent::Created(e) => {
                self.id = e.calendar_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.periods = e.periods.clone();
                self.periods.sort_by_key(|p| p.period_num);
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CalendarCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("calendar already exists"));
                }
                if self.id != cmd.calendar_id {
                    return Err(DomainError::invariant("calendar_id mismatch"));
                }
                if cmd.name.trim().is_empty() {
                    return Err(DomainError::validation("calendar name cannot be empty"));
                }

                let year_start = CalendarValidator::validate(&cmd.periods)?;
                let periods = cmd
                    .periods
                    .iter()
                    .map(|draft| Period::from_draft(draft, year_start))
                    .collect();

                Ok(vec![CalendarEvent::Created(CalendarCreated {
                    calendar_id: cmd.calendar_id,
                    name: cmd.name.trim().to_string(),
                    description: cmd.description.clone(),
                    periods,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for Calendar {
    const AGGREGATE_TYPE: &'static str = "gl.calendar";

    fn empty(id: CalendarId) -> Self {
        Calendar::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

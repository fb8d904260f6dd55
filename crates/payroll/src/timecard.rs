use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{
    Aggregate, AggregateRoot, DateEffective, DomainError, EffectiveDateInterval, EventSourced,
    TimeSpan, minutes_to_hours,
};
use tally_events::Event;
use tally_hr::PartyId;
use tally_projects::{ActivityId, PayrollId};

use crate::element::{ElementKind, ElementTypeId};
use crate::pay_cycle::{CycleWindow, Frequency};

tally_core::uuid_id!(
    /// Timecard identifier (aggregate id).
    pub TimecardId
);

/// Hours one activity contributed to one element on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailHours {
    pub activity_id: ActivityId,
    pub element_type_id: ElementTypeId,
    pub element_kind: ElementKind,
    pub spans: Vec<TimeSpan>,
    pub hours: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryHours {
    pub sequence: u32,
    pub date_worked: NaiveDate,
    pub hours: Decimal,
    pub details: Vec<DetailHours>,
}

impl SummaryHours {
    fn new(sequence: u32, date_worked: NaiveDate) -> Self {
        Self {
            sequence,
            date_worked,
            hours: Decimal::ZERO,
            details: Vec::new(),
        }
    }

    pub fn hours_for(&self, element: ElementTypeId) -> Decimal {
        self.details
            .iter()
            .filter(|d| d.element_type_id == element)
            .map(|d| d.hours)
            .sum()
    }

    pub fn detail(&self, activity: ActivityId, element: ElementTypeId) -> Option<&DetailHours> {
        self.details
            .iter()
            .find(|d| d.activity_id == activity && d.element_type_id == element)
    }
}

/// Aggregate root: Timecard (one position, one pay cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timecard {
    id: TimecardId,
    position_id: PartyId,
    payroll_id: PayrollId,
    window: CycleWindow,
    effective: EffectiveDateInterval,
    summaries: BTreeMap<NaiveDate, SummaryHours>,
    version: u64,
    created: bool,
}

impl Timecard {
    pub fn empty(id: TimecardId) -> Self {
        Self {
            id,
            position_id: PartyId::from_uuid(uuid::Uuid::nil()),
            payroll_id: PayrollId::from_uuid(uuid::Uuid::nil()),
            window: CycleWindow {
                start: NaiveDate::MIN,
                end: NaiveDate::MIN,
            },
            effective: EffectiveDateInterval::ALWAYS,
            summaries: BTreeMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn position_id(&self) -> PartyId {
        self.position_id
    }

    pub fn payroll_id(&self) -> PayrollId {
        self.payroll_id
    }

    pub fn window(&self) -> CycleWindow {
        self.window
    }

    /// Summary rows ordered by date worked.
    pub fn summaries(&self) -> impl Iterator<Item = &SummaryHours> {
        self.summaries.values()
    }

    pub fn summary(&self, date: NaiveDate) -> Option<&SummaryHours> {
        self.summaries.get(&date)
    }

    pub fn total_hours(&self) -> Decimal {
        self.summaries.values().map(|s| s.hours).sum()
    }

    pub fn hours_for(&self, element: ElementTypeId) -> Decimal {
        self.summaries.values().map(|s| s.hours_for(element)).sum()
    }

    /// Regular wage hours recorded on days before `date`.
    pub fn regular_hours_before(&self, date: NaiveDate) -> Decimal {
        self.summaries
            .range(..date)
            .flat_map(|(_, s)| s.details.iter())
            .filter(|d| d.element_kind == ElementKind::RegularWage)
            .map(|d| d.hours)
            .sum()
    }

    fn sequence_for(&self, date: NaiveDate) -> u32 {
        u32::try_from((date - self.window.start).num_days()).unwrap_or(0)
    }
}

impl DateEffective for Timecard {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}

impl AggregateRoot for Timecard {
    type Id = TimecardId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenTimecard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTimecard {
    pub timecard_id: TimecardId,
    pub position_id: PartyId,
    pub payroll_id: PayrollId,
    pub frequency: Frequency,
    pub window: CycleWindow,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordHours.
///
/// Replaces whatever was recorded for the same activity and element on that
/// day; an empty `spans` clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHours {
    pub timecard_id: TimecardId,
    pub date_worked: NaiveDate,
    pub activity_id: ActivityId,
    pub element_type_id: ElementTypeId,
    pub element_kind: ElementKind,
    pub spans: Vec<TimeSpan>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimecardCommand {
    Open(OpenTimecard),
    RecordHours(RecordHours),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimecardOpened {
    pub timecard_id: TimecardId,
    pub position_id: PartyId,
    pub payroll_id: PayrollId,
    pub window: CycleWindow,
    pub effective: EffectiveDateInterval,
    pub daily_summaries: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoursRecorded {
    pub timecard_id: TimecardId,
    pub date_worked: NaiveDate,
    pub activity_id: ActivityId,
    pub element_type_id: ElementTypeId,
    pub element_kind: ElementKind,
    pub spans: Vec<TimeSpan>,
    pub hours: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimecardEvent {
    Opened(TimecardOpened),
    HoursRecorded(HoursRecorded),
}

impl Event for TimecardEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TimecardEvent::Opened(_) => "payroll.timecard.opened",
            TimecardEvent::HoursRecorded(_) => "payroll.timecard.hours_recorded",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TimecardEvent::Opened(e) => e.occurred_at,
            TimecardEvent::HoursRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Timecard {
    type Command = TimecardCommand;
    type Event = TimecardEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TimecardEvent::Opened(e) => {
                self.id = e.timecard_id;
                self.position_id = e.position_id;
                self.payroll_id = e.payroll_id;
                self.window = e.window;
                self.effective = e.effective;
                if e.daily_summaries {
                    for (sequence, date) in (0u32..).zip(e.window.days()) {
                        self.summaries.insert(date, SummaryHours::new(sequence, date));
                    }
                }
                self.created = true;
            }
            TimecardEvent::HoursRecorded(e) => {
                let sequence = self.sequence_for(e.date_worked);
                let summary = self
                    .summaries
                    .entry(e.date_worked)
                    .or_insert_with(|| SummaryHours::new(sequence, e.date_worked));
                summary
                    .details
                    .retain(|d| !(d.activity_id == e.activity_id && d.element_type_id == e.element_type_id));
                if !e.spans.is_empty() {
                    summary.details.push(DetailHours {
                        activity_id: e.activity_id,
                        element_type_id: e.element_type_id,
                        element_kind: e.element_kind,
                        spans: e.spans.clone(),
                        hours: e.hours,
                    });
                }
                summary.hours = summary.details.iter().map(|d| d.hours).sum();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TimecardCommand::Open(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("timecard already exists"));
                }
                if self.id != cmd.timecard_id {
                    return Err(DomainError::invariant("timecard_id mismatch"));
                }
                let effective = cmd.window.interval()?;
                Ok(vec![TimecardEvent::Opened(TimecardOpened {
                    timecard_id: cmd.timecard_id,
                    position_id: cmd.position_id,
                    payroll_id: cmd.payroll_id,
                    window: cmd.window,
                    effective,
                    daily_summaries: cmd.frequency.has_daily_summaries(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            TimecardCommand::RecordHours(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found(format!("timecard {}", self.id)));
                }
                if !self.window.contains(cmd.date_worked) {
                    return Err(DomainError::validation(format!(
                        "date worked {} is outside timecard {} to {}",
                        cmd.date_worked, self.window.start, self.window.end
                    )));
                }
                if cmd.spans.iter().any(|s| s.date() != cmd.date_worked) {
                    return Err(DomainError::validation(
                        "time worked must start on the date worked",
                    ));
                }
                let minutes: i64 = cmd.spans.iter().map(|s| s.duration().num_minutes()).sum();
                Ok(vec![TimecardEvent::HoursRecorded(HoursRecorded {
                    timecard_id: cmd.timecard_id,
                    date_worked: cmd.date_worked,
                    activity_id: cmd.activity_id,
                    element_type_id: cmd.element_type_id,
                    element_kind: cmd.element_kind,
                    spans: cmd.spans.clone(),
                    hours: minutes_to_hours(minutes),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for Timecard {
    const AGGREGATE_TYPE: &'static str = "payroll.timecard";

    fn empty(id: TimecardId) -> Self {
        Timecard::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        date(d).and_hms_opt(h, m, 0).unwrap()
    }

    fn element_id(n: u128) -> ElementTypeId {
        ElementTypeId::from_uuid(Uuid::from_u128(10 + n))
    }

    fn activity_id(n: u128) -> ActivityId {
        ActivityId::from_uuid(Uuid::from_u128(20 + n))
    }

    fn open(frequency: Frequency) -> Timecard {
        let id = TimecardId::from_uuid(Uuid::from_u128(1));
        let mut card = Timecard::empty(id);
        let events = card
            .handle(&TimecardCommand::Open(OpenTimecard {
                timecard_id: id,
                position_id: PartyId::from_uuid(Uuid::from_u128(2)),
                payroll_id: PayrollId::from_uuid(Uuid::from_u128(3)),
                frequency,
                window: CycleWindow { start: date(10), end: date(16) },
                occurred_at: Utc::now(),
            }))
            .unwrap();
        card.apply(&events[0]);
        card
    }

    fn record(card: &mut Timecard, day: u32, activity: u128, kind: ElementKind, spans: Vec<TimeSpan>) -> Result<(), DomainError> {
        let element = match kind {
            ElementKind::Overtime => element_id(2),
            _ => element_id(1),
        };
        let events = card.handle(&TimecardCommand::RecordHours(RecordHours {
            timecard_id: *card.id(),
            date_worked: date(day),
            activity_id: activity_id(activity),
            element_type_id: element,
            element_kind: kind,
            spans,
            occurred_at: Utc::now(),
        }))?;
        for event in &events {
            card.apply(event);
        }
        Ok(())
    }

    fn slot(d: u32, from: (u32, u32), to: (u32, u32)) -> TimeSpan {
        TimeSpan::new(at(d, from.0, from.1), at(d, to.0, to.1)).unwrap()
    }

    #[test]
    fn weekly_timecards_open_with_daily_rows() {
        let card = open(Frequency::Weekly);
        let sequences: Vec<u32> = card.summaries().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(card.is_effective(date(16)));
        assert!(!card.is_effective(date(17)));

        let monthly = open(Frequency::Monthly);
        assert_eq!(monthly.summaries().count(), 0);
    }

    #[test]
    fn recording_replaces_the_same_activity_and_element() {
        let mut card = open(Frequency::Monthly);
        record(&mut card, 12, 1, ElementKind::RegularWage, vec![slot(12, (9, 0), (17, 0))]).unwrap();
        record(&mut card, 12, 1, ElementKind::RegularWage, vec![slot(12, (9, 0), (13, 30))]).unwrap();
        record(&mut card, 12, 2, ElementKind::RegularWage, vec![slot(12, (14, 0), (16, 0))]).unwrap();
        record(
            &mut card,
            12,
            1,
            ElementKind::Overtime,
            vec![slot(12, (7, 0), (9, 0)), slot(12, (17, 0), (17, 45))],
        )
        .unwrap();

        let summary = card.summary(date(12)).unwrap();
        assert_eq!(summary.sequence, 2);
        assert_eq!(summary.hours_for(element_id(1)), dec!(6.5));
        assert_eq!(summary.hours_for(element_id(2)), dec!(2.75));
        assert_eq!(card.total_hours(), dec!(9.25));
        assert_eq!(card.regular_hours_before(date(13)), dec!(6.5));
        assert_eq!(card.regular_hours_before(date(12)), dec!(0));

        record(&mut card, 12, 2, ElementKind::RegularWage, vec![]).unwrap();
        assert_eq!(card.hours_for(element_id(1)), dec!(4.5));
    }

    #[test]
    fn hours_outside_the_cycle_are_rejected() {
        let mut card = open(Frequency::Weekly);
        let err = record(&mut card, 17, 1, ElementKind::RegularWage, vec![slot(17, (9, 0), (10, 0))]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = record(&mut card, 12, 1, ElementKind::RegularWage, vec![slot(13, (9, 0), (10, 0))]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(card.total_hours(), dec!(0));
        assert_eq!(card.version(), 1);
    }
}

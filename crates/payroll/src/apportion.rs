//! Hour apportionment.
//!
//! Each element kind maps to a pure function that slices one scheduled day of
//! an activity into the time spans payable under that element, given the
//! position's work rules and the regular hours already on the timecard.

use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use tally_core::TimeSpan;
use tally_hr::WorkRules;
use tally_projects::ActivityKind;

use crate::element::{ElementKind, ElementType, InputValueKind};

/// One scheduled day for one position.
#[derive(Debug, Clone, Copy)]
pub struct WorkDay<'a> {
    pub span: TimeSpan,
    pub activity_kind: ActivityKind,
    pub rules: &'a WorkRules,
    pub minimum_call: Duration,
    /// Regular hours recorded on the timecard before this day.
    pub prior_regular_hours: Decimal,
}

impl<'a> WorkDay<'a> {
    /// The element's minimum call input wins over the position's work rules.
    pub fn new(
        span: TimeSpan,
        activity_kind: ActivityKind,
        rules: &'a WorkRules,
        element: &ElementType,
        prior_regular_hours: Decimal,
    ) -> Self {
        let minimum_call = element
            .value_on(InputValueKind::MinimumCall, span.date())
            .map(|iv| hours(iv.default_value))
            .unwrap_or_else(|| rules.minimum_call_duration());
        Self {
            span,
            activity_kind,
            rules,
            minimum_call,
            prior_regular_hours,
        }
    }

    fn is_weekend_overtime(&self) -> bool {
        self.rules.weekend_overtime && WorkRules::is_weekend(self.span.date())
    }

    fn normal_start(&self) -> NaiveDateTime {
        self.span.date().and_time(self.rules.normal_start)
    }

    fn normal_end_on(&self, at: NaiveDateTime) -> NaiveDateTime {
        at.date().and_time(self.rules.normal_end)
    }

    /// Regular time still available under the maximum, if one applies.
    fn available(&self) -> Option<Duration> {
        if self.rules.maximum_hours <= Decimal::ZERO {
            return None;
        }
        let left = (self.rules.maximum_hours - self.prior_regular_hours).max(Decimal::ZERO);
        Some(hours(left))
    }
}

pub type Apportion = fn(&WorkDay<'_>) -> Vec<TimeSpan>;

/// Apportionment rule for an element kind.
pub fn apportioner(kind: ElementKind) -> Apportion {
    match kind {
        ElementKind::RegularWage => regular_hours,
        ElementKind::Overtime => overtime_hours,
        ElementKind::PerformanceWage => performance_hours,
        ElementKind::Generic
        | ElementKind::GroupTermLife
        | ElementKind::PerformanceFee
        | ElementKind::RegularSalary
        | ElementKind::Shift => no_hours,
    }
}

fn regular_hours(day: &WorkDay<'_>) -> Vec<TimeSpan> {
    if day.activity_kind.is_performance() || day.is_weekend_overtime() {
        return Vec::new();
    }
    let start = day.span.start().max(day.normal_start());
    let mut end = day.span.end().max(plus(start, day.minimum_call));
    end = end.min(day.normal_end_on(end));
    if let Some(available) = day.available() {
        end = end.min(plus(start, available));
    }
    span(start, end).into_iter().collect()
}

fn overtime_hours(day: &WorkDay<'_>) -> Vec<TimeSpan> {
    if day.is_weekend_overtime() {
        return vec![day.span];
    }
    let start = day.span.start();
    let reg_start = start.max(day.normal_start());
    let mut spans: Vec<TimeSpan> = span(start, reg_start.min(day.span.end())).into_iter().collect();

    let end = day.span.end().max(plus(reg_start, day.minimum_call));
    let mut reg_end = end.min(day.normal_end_on(end));
    if let Some(available) = day.available() {
        reg_end = reg_end.min(plus(reg_start, available));
    }
    spans.extend(span(reg_end.max(reg_start), end));
    spans
}

fn performance_hours(day: &WorkDay<'_>) -> Vec<TimeSpan> {
    if day.activity_kind.is_performance() {
        vec![day.span]
    } else {
        Vec::new()
    }
}

fn no_hours(_: &WorkDay<'_>) -> Vec<TimeSpan> {
    Vec::new()
}

fn span(start: NaiveDateTime, end: NaiveDateTime) -> Option<TimeSpan> {
    TimeSpan::new(start, end).ok().filter(|s| !s.is_empty())
}

fn plus(at: NaiveDateTime, by: Duration) -> NaiveDateTime {
    at.checked_add_signed(by).unwrap_or(NaiveDateTime::MAX)
}

fn hours(value: Decimal) -> Duration {
    let minutes = (value * Decimal::from(60)).round().to_i64().unwrap_or(0);
    Duration::minutes(minutes)
}

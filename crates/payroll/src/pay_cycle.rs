//! Pay cycle boundaries.
//!
//! A pay cycle partitions time into consecutive windows (weeks, half months,
//! quarters, ...). Timecards are opened per window, so every consumer asks the
//! same three questions: where does the window containing a time span start,
//! where does a window end, and how many boundaries does the span cross.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use tally_core::{DateEffective, DomainError, DomainResult, EffectiveDateInterval, TimeSpan};
use tally_projects::PayrollId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    FlatFee,
    Weekly,
    Biweekly,
    SemiMonthly,
    Monthly,
    Quarterly,
    Annual,
}

impl Frequency {
    pub fn meaning(self) -> &'static str {
        match self {
            Frequency::FlatFee => "Once (Flat fee)",
            Frequency::Weekly => "Weekly",
            Frequency::Biweekly => "Bi-Weekly",
            Frequency::SemiMonthly => "Semi-Monthly",
            Frequency::Monthly => "Monthly",
            Frequency::Quarterly => "Quarterly",
            Frequency::Annual => "Annually",
        }
    }

    /// Timecards on these cycles carry one summary row per calendar day.
    pub fn has_daily_summaries(self) -> bool {
        matches!(self, Frequency::Weekly | Frequency::Biweekly)
    }
}

/// One pay cycle, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CycleWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CycleWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(|d| *d <= self.end)
    }

    pub fn interval(&self) -> DomainResult<EffectiveDateInterval> {
        EffectiveDateInterval::from_dates(Some(self.start), Some(self.end))
    }
}

/// Boundary arithmetic for one frequency.
///
/// `period_end_day` only matters for weekly and biweekly cycles: a cycle
/// starts on the day after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayCycleCalculator {
    frequency: Frequency,
    period_end_day: Weekday,
}

impl PayCycleCalculator {
    pub fn new(frequency: Frequency, period_end_day: Weekday) -> Self {
        Self {
            frequency,
            period_end_day,
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn cycle_start_day(&self) -> Weekday {
        self.period_end_day.succ()
    }

    /// First day of the cycle containing the start of `span`.
    pub fn cycle_start(&self, span: &TimeSpan) -> DomainResult<NaiveDate> {
        let date = span.start().date();
        match self.frequency {
            Frequency::Weekly | Frequency::Biweekly => Ok(self.weekly_start(date)),
            Frequency::SemiMonthly => {
                let day = if date.day() <= 15 { 1 } else { 16 };
                first_of_month(date).and_then(|d| add_days(d, day - 1))
            }
            Frequency::Monthly => first_of_month(date),
            Frequency::Quarterly => quarter_start(date),
            Frequency::Annual => ymd(date.year(), 1, 1),
            Frequency::FlatFee => Err(flat_fee()),
        }
    }

    /// Last day of the cycle starting on `start`.
    pub fn cycle_end(&self, start: NaiveDate) -> DomainResult<NaiveDate> {
        match self.frequency {
            Frequency::Weekly => add_days(start, 6),
            Frequency::Biweekly => add_days(start, 13),
            Frequency::SemiMonthly if start.day() == 1 => add_days(start, 14),
            Frequency::SemiMonthly | Frequency::Monthly => last_of_month(start),
            Frequency::Quarterly => start
                .checked_add_months(Months::new(2))
                .ok_or_else(out_of_range)
                .and_then(last_of_month),
            Frequency::Annual => ymd(start.year(), 12, 31),
            Frequency::FlatFee => Err(flat_fee()),
        }
    }

    /// Boundary count for `span`.
    ///
    /// Weekly and biweekly cycles count the whole days elapsed from the
    /// containing cycle start to the end of the span. Half-monthly, monthly and
    /// quarterly cycles count the windows touched by the span. Annual cycles
    /// count calendar years. A flat fee has no cycles.
    pub fn cycle_periods(&self, span: &TimeSpan) -> DomainResult<u32> {
        let start = span.start().date();
        let end = span.end().date();
        let count = match self.frequency {
            Frequency::FlatFee => 0,
            Frequency::Weekly | Frequency::Biweekly => {
                let anchor = self.weekly_start(start).and_time(NaiveTime::MIN);
                (span.end() - anchor).num_days()
            }
            Frequency::SemiMonthly => {
                let first_half = |d: NaiveDate| d.day() <= 15;
                let adj_start = if first_half(start) {
                    first_of_month(start)?
                } else {
                    add_days(first_of_month(start)?, 15)?
                };
                let adj_end = if first_half(end) {
                    first_of_month(end)?
                } else {
                    last_of_month(end)?
                };
                let halves = if first_half(start) == first_half(end) { 1 } else { 2 };
                months_between(adj_start, adj_end) * 2 + halves
            }
            Frequency::Monthly => {
                let adj_start = first_of_month(start)?;
                let adj_end = if end.day() < 15 {
                    first_of_month(end)?
                } else {
                    last_of_month(end)?
                };
                months_between(adj_start, adj_end) + 1
            }
            Frequency::Quarterly => {
                let adj_start = quarter_start(start)?;
                let adj_end = quarter_start(end)?
                    .checked_add_months(Months::new(2))
                    .ok_or_else(out_of_range)
                    .and_then(last_of_month)?;
                (months_between(adj_start, adj_end) + 1 + 2) / 3
            }
            Frequency::Annual => i64::from(end.year() - start.year()) + 1,
        };
        u32::try_from(count.max(0)).map_err(|_| out_of_range())
    }

    /// Consecutive cycle windows covering `span`, in order.
    pub fn cycles(&self, span: &TimeSpan) -> DomainResult<Vec<CycleWindow>> {
        if self.frequency == Frequency::FlatFee {
            return Ok(Vec::new());
        }
        let last = last_day(span);
        let mut windows = Vec::new();
        let mut start = self.cycle_start(span)?;
        while start <= last {
            let end = self.cycle_end(start)?;
            windows.push(CycleWindow { start, end });
            start = add_days(end, 1)?;
        }
        Ok(windows)
    }

    fn weekly_start(&self, date: NaiveDate) -> NaiveDate {
        let back = (i64::from(date.weekday().num_days_from_monday())
            - i64::from(self.cycle_start_day().num_days_from_monday()))
        .rem_euclid(7);
        // `back` is within 0..7.
        date - chrono::Duration::days(back)
    }
}

/// A named pay cycle definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayCycle {
    pub name: String,
    pub frequency: Frequency,
    pub period_end_day: Weekday,
    /// Days from the cycle end to the pay date.
    pub pay_date_offset: i32,
    pub non_cash: bool,
}

impl PayCycle {
    pub fn calculator(&self) -> PayCycleCalculator {
        PayCycleCalculator::new(self.frequency, self.period_end_day)
    }

    pub fn pay_date(&self, cycle_end: NaiveDate) -> DomainResult<NaiveDate> {
        let offset = u64::from(self.pay_date_offset.unsigned_abs());
        let moved = if self.pay_date_offset >= 0 {
            cycle_end.checked_add_days(Days::new(offset))
        } else {
            cycle_end.checked_sub_days(Days::new(offset))
        };
        moved.ok_or_else(out_of_range)
    }
}

/// A payroll: the pay cycle positions are paid on, with its own validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payroll {
    pub id: PayrollId,
    pub name: String,
    pub pay_cycle: PayCycle,
    pub effective: EffectiveDateInterval,
}

impl Payroll {
    pub fn cycle_periods(&self, span: &TimeSpan) -> DomainResult<u32> {
        self.pay_cycle.calculator().cycle_periods(span)
    }
}

impl DateEffective for Payroll {
    fn effective_range(&self) -> &EffectiveDateInterval {
        &self.effective
    }
}

/// Whole months from `from` to `to` (zero when `to` precedes `from`).
fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let mut months = i64::from(to.year() - from.year()) * 12 + i64::from(to.month())
        - i64::from(from.month());
    while months > 0 {
        let reached = u32::try_from(months)
            .ok()
            .and_then(|m| from.checked_add_months(Months::new(m)))
            .is_some_and(|d| d <= to);
        if reached {
            break;
        }
        months -= 1;
    }
    months.max(0)
}

/// Last calendar day touched by a span; a span ending at midnight stops the day before.
fn last_day(span: &TimeSpan) -> NaiveDate {
    let end = span.end();
    if end.time() == NaiveTime::MIN && end > span.start() {
        end.date().pred_opt().unwrap_or(end.date())
    } else {
        end.date()
    }
}

fn ymd(year: i32, month: u32, day: u32) -> DomainResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(out_of_range)
}

fn first_of_month(date: NaiveDate) -> DomainResult<NaiveDate> {
    ymd(date.year(), date.month(), 1)
}

fn last_of_month(date: NaiveDate) -> DomainResult<NaiveDate> {
    first_of_month(date)?
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(out_of_range)
}

fn quarter_start(date: NaiveDate) -> DomainResult<NaiveDate> {
    let month = (date.month0() / 3) * 3 + 1;
    ymd(date.year(), month, 1)
}

fn add_days(date: NaiveDate, days: u32) -> DomainResult<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(out_of_range)
}

fn out_of_range() -> DomainError {
    DomainError::validation("pay cycle date out of range")
}

fn flat_fee() -> DomainError {
    DomainError::validation("flat fee pay cycles have no cycle boundaries")
}

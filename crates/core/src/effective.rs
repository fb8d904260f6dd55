//! Effective dating: validity windows attached to facts.
//!
//! An [`EffectiveDateInterval`] is stored half-open, `[start, end)`, on instants.
//! A missing start means "since the beginning of time" and a missing end means
//! "until further notice". Intervals built from calendar dates treat the end date
//! as inclusive: `from_dates(d1, d2)` stores `d2 + 1 day 00:00` as its end, so
//! the public date predicate answers true on both `d1` and `d2`.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Anything whose applicability is bounded by an effective interval.
pub trait DateEffective {
    fn effective_range(&self) -> &EffectiveDateInterval;

    /// Whether the whole calendar day `date` falls inside the effective range.
    fn is_effective(&self, date: NaiveDate) -> bool {
        self.effective_range().is_effective(date)
    }

    fn is_effective_at(&self, at: NaiveDateTime) -> bool {
        self.effective_range().is_effective_at(at)
    }
}

/// Half-open validity range with optional (infinite) bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EffectiveDateInterval {
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl ValueObject for EffectiveDateInterval {}

impl EffectiveDateInterval {
    /// In force for all time.
    pub const ALWAYS: Self = Self {
        start: None,
        end: None,
    };

    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> DomainResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(DomainError::validation(format!(
                    "effective interval ends ({e}) before it starts ({s})"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// Build from calendar dates; `end` is the last day on which the fact applies.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> DomainResult<Self> {
        let end = match end {
            Some(date) => Some(
                next_midnight(date)
                    .ok_or_else(|| DomainError::validation("effective end date out of range"))?,
            ),
            None => None,
        };
        Self::new(start.map(midnight), end)
    }

    /// Open-ended interval starting at midnight of `date`.
    pub fn starting_on(date: NaiveDate) -> Self {
        Self {
            start: Some(midnight(date)),
            end: None,
        }
    }

    pub fn start(&self) -> Option<NaiveDateTime> {
        self.start
    }

    /// Exclusive end instant.
    pub fn end(&self) -> Option<NaiveDateTime> {
        self.end
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start.map(|s| s.date())
    }

    /// Last calendar day touched by the interval (inclusive).
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end.map(|e| {
            if e.time() == NaiveTime::MIN {
                e.date().pred_opt().unwrap_or(e.date())
            } else {
                e.date()
            }
        })
    }

    /// Whether the whole day `date` lies inside the interval.
    pub fn is_effective(&self, date: NaiveDate) -> bool {
        let day_start = midnight(date);
        let after_start = self.start.is_none_or(|s| s <= day_start);
        let before_end = match (self.end, next_midnight(date)) {
            (None, _) => true,
            (Some(end), Some(day_end)) => day_end <= end,
            (Some(_), None) => false,
        };
        after_start && before_end
    }

    /// Half-open instant test: `start <= at < end`.
    pub fn is_effective_at(&self, at: NaiveDateTime) -> bool {
        self.start.is_none_or(|s| s <= at) && self.end.is_none_or(|e| at < e)
    }

    pub fn contains(&self, other: &Self) -> bool {
        let starts_before = match (self.start, other.start) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a <= b,
        };
        let ends_after = match (self.end, other.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b <= a,
        };
        starts_before && ends_after
    }

    /// Intersection of two intervals; `None` when they do not overlap.
    ///
    /// Abutting intervals (`a.end == b.start`) share no instant and do not overlap.
    pub fn overlap(&self, other: &Self) -> Option<Self> {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        match (start, end) {
            (Some(s), Some(e)) if s >= e => None,
            _ => Some(Self { start, end }),
        }
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.overlap(other).is_some()
    }

    /// Portion of a bounded span that falls inside this interval.
    pub fn overlap_span(&self, span: &TimeSpan) -> Option<TimeSpan> {
        let clipped = self.overlap(&EffectiveDateInterval::from(*span))?;
        match (clipped.start, clipped.end) {
            (Some(start), Some(end)) => Some(TimeSpan { start, end }),
            _ => None,
        }
    }
}

impl From<TimeSpan> for EffectiveDateInterval {
    fn from(span: TimeSpan) -> Self {
        Self {
            start: Some(span.start),
            end: Some(span.end),
        }
    }
}

/// Bounded half-open span of time, e.g. the hours worked on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSpan {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl ValueObject for TimeSpan {}

impl TimeSpan {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> DomainResult<Self> {
        if end < start {
            return Err(DomainError::validation(format!(
                "time span ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Span on `date` between two clock times; an end before the start rolls to the next day.
    pub fn on(date: NaiveDate, from: NaiveTime, to: NaiveTime) -> DomainResult<Self> {
        let start = date.and_time(from);
        let end = if to < from {
            next_midnight(date)
                .map(|d| d.date().and_time(to))
                .ok_or_else(|| DomainError::validation("time span end out of range"))?
        } else {
            date.and_time(to)
        };
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Elapsed time in decimal hours, to the minute.
    pub fn hours(&self) -> Decimal {
        minutes_to_hours(self.duration().num_minutes())
    }
}

/// Convert whole minutes to hours, rounded to four decimal places.
pub fn minutes_to_hours(minutes: i64) -> Decimal {
    (Decimal::from(minutes) / Decimal::from(60)).round_dp(4)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn next_midnight(date: NaiveDate) -> Option<NaiveDateTime> {
    date.succ_opt().map(midnight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn date_bounds_are_inclusive_on_both_ends() {
        let range =
            EffectiveDateInterval::from_dates(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)))
                .unwrap();
        assert!(range.is_effective(date(2024, 1, 1)));
        assert!(range.is_effective(date(2024, 1, 31)));
        assert!(!range.is_effective(date(2023, 12, 31)));
        assert!(!range.is_effective(date(2024, 2, 1)));
        assert_eq!(range.end(), Some(at(2024, 2, 1, 0, 0)));
        assert_eq!(range.end_date(), Some(date(2024, 1, 31)));
    }

    #[test]
    fn missing_bounds_are_infinite() {
        let always = EffectiveDateInterval::ALWAYS;
        assert!(always.is_effective(date(1900, 1, 1)));
        assert!(always.is_effective(NaiveDate::MAX));

        let open = EffectiveDateInterval::starting_on(date(2024, 3, 1));
        assert!(!open.is_effective(date(2024, 2, 29)));
        assert!(open.is_effective(date(2999, 1, 1)));
    }

    #[test]
    fn instant_test_is_half_open() {
        let range = EffectiveDateInterval::new(
            Some(at(2024, 1, 1, 9, 0)),
            Some(at(2024, 1, 1, 17, 0)),
        )
        .unwrap();
        assert!(range.is_effective_at(at(2024, 1, 1, 9, 0)));
        assert!(!range.is_effective_at(at(2024, 1, 1, 17, 0)));
        // 09:00..17:00 does not cover the whole day.
        assert!(!range.is_effective(date(2024, 1, 1)));
    }

    #[test]
    fn reversed_bounds_are_rejected() {
        let err =
            EffectiveDateInterval::from_dates(Some(date(2024, 2, 1)), Some(date(2024, 1, 1)))
                .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(TimeSpan::new(at(2024, 1, 1, 10, 0), at(2024, 1, 1, 9, 0)).is_err());
    }

    #[test]
    fn overlap_returns_intersection() {
        let a = EffectiveDateInterval::from_dates(Some(date(2024, 1, 1)), Some(date(2024, 1, 20)))
            .unwrap();
        let b = EffectiveDateInterval::from_dates(Some(date(2024, 1, 10)), None).unwrap();
        let both = a.overlap(&b).unwrap();
        assert_eq!(both.start_date(), Some(date(2024, 1, 10)));
        assert_eq!(both.end_date(), Some(date(2024, 1, 20)));
    }

    #[test]
    fn abutting_intervals_do_not_overlap() {
        let january =
            EffectiveDateInterval::from_dates(Some(date(2024, 1, 1)), Some(date(2024, 1, 31)))
                .unwrap();
        let february =
            EffectiveDateInterval::from_dates(Some(date(2024, 2, 1)), Some(date(2024, 2, 29)))
                .unwrap();
        assert!(january.overlap(&february).is_none());
        assert!(!february.overlaps(&january));
    }

    #[test]
    fn overlap_span_clips_to_range() {
        let range = EffectiveDateInterval::new(Some(at(2024, 1, 1, 12, 0)), None).unwrap();
        let span = TimeSpan::new(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 15, 30)).unwrap();
        let clipped = range.overlap_span(&span).unwrap();
        assert_eq!(clipped.start(), at(2024, 1, 1, 12, 0));
        assert_eq!(clipped.hours(), dec!(3.5));
    }

    #[test]
    fn span_rolls_past_midnight() {
        let span = TimeSpan::on(
            date(2024, 1, 1),
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(span.end(), at(2024, 1, 2, 1, 0));
        assert_eq!(span.hours(), dec!(3));
    }

    #[test]
    fn contains_respects_infinite_bounds() {
        let always = EffectiveDateInterval::ALWAYS;
        let year = EffectiveDateInterval::from_dates(Some(date(2024, 1, 1)), Some(date(2024, 12, 31)))
            .unwrap();
        assert!(always.contains(&year));
        assert!(!year.contains(&always));
        assert!(year.contains(&year));
    }

    #[test]
    fn serializes_through_json() {
        let range = EffectiveDateInterval::from_dates(Some(date(2024, 1, 1)), None).unwrap();
        let json = serde_json::to_string(&range).unwrap();
        let back: EffectiveDateInterval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);
    }

    proptest! {
        #[test]
        fn inclusive_dates_cover_exactly_their_days(offset in 0i64..3650, len in 0i64..400) {
            let first = date(2000, 1, 1) + Duration::days(offset);
            let last = first + Duration::days(len);
            let range = EffectiveDateInterval::from_dates(Some(first), Some(last)).unwrap();

            prop_assert!(range.is_effective(first));
            prop_assert!(range.is_effective(last));
            prop_assert!(!range.is_effective(last + Duration::days(1)));
            prop_assert!(!range.is_effective(first - Duration::days(1)));
        }
    }
}

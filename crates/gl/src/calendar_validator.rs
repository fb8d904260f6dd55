//! Validation of a proposed accounting-period set.
//!
//! Checks run over the whole set in a fixed order and stop at the first
//! failure: period numbers unique, period numbers in range, no strict
//! containment between regular periods, no gaps between consecutive regular
//! periods. On success the year start (earliest period start) is returned so
//! it can be stamped onto every period.
//!
//! The overlap rule only catches a period that strictly contains another
//! (`a.start < b.start && a.end > b.end`); partial overlaps pass it.

use std::collections::HashSet;

use chrono::{Days, NaiveDate};

use tally_core::{DomainError, DomainResult};

use crate::calendar::PeriodDraft;

pub struct CalendarValidator;

impl CalendarValidator {
    /// Validate `periods` in array order, returning the year start date.
    pub fn validate(periods: &[PeriodDraft]) -> DomainResult<NaiveDate> {
        if periods.is_empty() {
            return Err(DomainError::validation("calendar must have at least one period"));
        }
        Self::check_dates(periods)?;
        Self::check_unique_numbers(periods)?;
        Self::check_number_range(periods)?;
        Self::check_overlap(periods)?;
        Self::check_gaps(periods)?;
        Self::year_start(periods)
    }

    fn check_dates(periods: &[PeriodDraft]) -> DomainResult<()> {
        match periods.iter().find(|p| p.end < p.start) {
            Some(p) => Err(DomainError::validation(format!(
                "period {} ends before it starts",
                p.period_num
            ))),
            None => Ok(()),
        }
    }

    fn check_unique_numbers(periods: &[PeriodDraft]) -> DomainResult<()> {
        let mut seen = HashSet::new();
        for period in periods {
            if !seen.insert(period.period_num) {
                return Err(DomainError::validation("duplicate period number"));
            }
        }
        Ok(())
    }

    fn check_number_range(periods: &[PeriodDraft]) -> DomainResult<()> {
        for period in periods {
            let max = period.period_type.period_count();
            if period.period_num < 1 || period.period_num > max {
                return Err(DomainError::validation(format!(
                    "period number out of bounds: {} not in 1..={max}",
                    period.period_num
                )));
            }
        }
        Ok(())
    }

    fn check_overlap(periods: &[PeriodDraft]) -> DomainResult<()> {
        let regular: Vec<&PeriodDraft> = periods.iter().filter(|p| !p.adjustment).collect();
        for (i, a) in regular.iter().enumerate() {
            for (j, b) in regular.iter().enumerate() {
                if i != j && a.start < b.start && a.end > b.end {
                    return Err(DomainError::validation("period date overlap"));
                }
            }
        }
        Ok(())
    }

    fn check_gaps(periods: &[PeriodDraft]) -> DomainResult<()> {
        let regular: Vec<&PeriodDraft> = periods.iter().filter(|p| !p.adjustment).collect();
        for pair in regular.windows(2) {
            let next_start = pair[0].end.checked_add_days(Days::new(1));
            if next_start != Some(pair[1].start) {
                return Err(DomainError::validation(format!(
                    "gap found in calendar periods after period {}",
                    pair[0].period_num
                )));
            }
        }
        Ok(())
    }

    fn year_start(periods: &[PeriodDraft]) -> DomainResult<NaiveDate> {
        periods
            .iter()
            .map(|p| p.start)
            .min()
            .ok_or_else(|| DomainError::validation("calendar must have at least one period"))
    }
}

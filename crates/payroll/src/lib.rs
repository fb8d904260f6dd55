//! Payroll rules.
//!
//! Pay cycles and their boundary arithmetic, element types with their input
//! values, hour apportionment against a position's work rules, event-sourced
//! timecards, and element entries that turn recorded hours into pay.

pub mod apportion;
pub mod element;
pub mod entry;
pub mod pay_cycle;
pub mod timecard;

pub use apportion::{Apportion, WorkDay, apportioner};
pub use element::{
    Classification, ElementCategory, ElementKind, ElementLink, ElementType, ElementTypeId,
    InputValue, InputValueKind, ProcessingType,
};
pub use entry::{ElementEntry, ElementEntryValue, ProcessedEntry};
pub use pay_cycle::{CycleWindow, Frequency, PayCycle, PayCycleCalculator, Payroll};
pub use tally_projects::PayrollId;
pub use timecard::{
    DetailHours, OpenTimecard, RecordHours, SummaryHours, Timecard, TimecardCommand,
    TimecardEvent, TimecardId,
};

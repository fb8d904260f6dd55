//! General ledger (event-sourced).
//!
//! Segmented account structures and the generated chart of accounts,
//! accounting calendars, ledgers with per-period account balances, and
//! double-entry journal entries.
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod account_generator;
pub mod balance_checker;
pub mod calendar;
pub mod calendar_validator;
pub mod journal;
pub mod ledger;
pub mod structure;

pub use account_generator::{AccountCodeGenerator, DEFAULT_SEPARATOR};
pub use balance_checker::{LedgerBalanceChecker, Posting};
pub use calendar::{
    Calendar, CalendarCommand, CalendarEvent, CalendarId, CreateCalendar, Period, PeriodDraft,
    PeriodId, PeriodType,
};
pub use calendar_validator::CalendarValidator;
pub use journal::{
    CreateJournalEntry, DeleteJournalEntry, EntryStatus, JournalCommand, JournalEntry,
    JournalEntryId, JournalEvent, JournalLine, NewJournalLine, PostJournalEntry,
};
pub use ledger::{
    AccountBalance, BalanceKey, CreateLedger, Ledger, LedgerCommand, LedgerEvent, LedgerId,
    LedgerPeriod, RecordPosting,
};
pub use structure::{
    AccountCode, AccountCodeId, AccountType, AddSegment, AddSegmentValue, ChangeStructureStatus,
    CreateStructure, DeleteSegmentValue, NewSegment, NewSegmentValue, RecordChartOfAccounts,
    Segment, SegmentId, SegmentValue, SegmentValueId, Structure, StructureCommand,
    StructureEvent, StructureId,
};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, CurrencyCode, DomainError, EventSourced};
use tally_events::Event;

use crate::balance_checker::{LedgerBalanceChecker, Posting};
use crate::calendar::PeriodId;
use crate::ledger::LedgerId;
use crate::structure::AccountCodeId;

tally_core::uuid_id!(
    /// Journal entry identifier (aggregate id).
    pub JournalEntryId
);

/// Lifecycle of a journal entry. `Posted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Unposted,
    Posted,
}

/// Journal line as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalLine {
    pub account_code_id: AccountCodeId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Position within the entry, starting at 0.
    pub sequence: u32,
    pub account_code_id: AccountCodeId,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
}

/// Aggregate root: JournalEntry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    id: JournalEntryId,
    ledger_id: Option<LedgerId>,
    period_id: Option<PeriodId>,
    name: String,
    description: Option<String>,
    category: Option<String>,
    currency: Option<CurrencyCode>,
    effective_date: Option<NaiveDate>,
    posted_date: Option<NaiveDate>,
    status: EntryStatus,
    lines: Vec<JournalLine>,
    running_total_debit: Decimal,
    running_total_credit: Decimal,
    deleted: bool,
    version: u64,
    created: bool,
}

impl JournalEntry {
    pub fn empty(id: JournalEntryId) -> Self {
        Self {
            id,
            ledger_id: None,
            period_id: None,
            name: String::new(),
            description: None,
            category: None,
            currency: None,
            effective_date: None,
            posted_date: None,
            status: EntryStatus::Unposted,
            lines: Vec::new(),
            running_total_debit: Decimal::ZERO,
            running_total_credit: Decimal::ZERO,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn ledger_id(&self) -> Option<LedgerId> {
        self.ledger_id
    }

    pub fn period_id(&self) -> Option<PeriodId> {
        self.period_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn currency(&self) -> Option<&CurrencyCode> {
        self.currency.as_ref()
    }

    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.effective_date
    }

    pub fn posted_date(&self) -> Option<NaiveDate> {
        self.posted_date
    }

    pub fn status(&self) -> EntryStatus {
        self.status
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn lines(&self) -> &[JournalLine] {
        &self.lines
    }

    /// Totals recorded when the entry was posted; zero before.
    pub fn running_totals(&self) -> (Decimal, Decimal) {
        (self.running_total_debit, self.running_total_credit)
    }

    /// Amounts this entry contributes to the ledger balances.
    pub fn postings(&self) -> Vec<Posting> {
        LedgerBalanceChecker::postings(&self.lines)
    }
}

impl AggregateRoot for JournalEntry {
    type Id = JournalEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJournalEntry {
    pub entry_id: JournalEntryId,
    pub ledger_id: LedgerId,
    pub period_id: PeriodId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub currency: CurrencyCode,
    pub effective_date: NaiveDate,
    pub lines: Vec<NewJournalLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub entry_id: JournalEntryId,
    pub posted_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteJournalEntry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteJournalEntry {
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalCommand {
    Create(CreateJournalEntry),
    Post(PostJournalEntry),
    Delete(DeleteJournalEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryCreated {
    pub entry_id: JournalEntryId,
    pub ledger_id: LedgerId,
    pub period_id: PeriodId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub currency: CurrencyCode,
    pub effective_date: NaiveDate,
    pub lines: Vec<JournalLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub entry_id: JournalEntryId,
    pub posted_date: NaiveDate,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryDeleted {
    pub entry_id: JournalEntryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    Created(JournalEntryCreated),
    Posted(JournalEntryPosted),
    Deleted(JournalEntryDeleted),
}

impl Event for JournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEvent::Created(_) => "gl.journal_entry.created",
            JournalEvent::Posted(_) => "gl.journal_entry.posted",
            JournalEvent::Deleted(_) => "gl.journal_entry.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEvent::Created(e) => e.occurred_at,
            JournalEvent::Posted(e) => e.occurred_at,
            JournalEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for JournalEntry {
    type Command = JournalCommand;
    type Event = JournalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEvent::Created(e) => {
                self.id = e.entry_id;
                self.ledger_id = Some(e.ledger_id);
                self.period_id = Some(e.period_id);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.category = e.category.clone();
                self.currency = Some(e.currency.clone());
                self.effective_date = Some(e.effective_date);
                self.status = EntryStatus::Unposted;
                self.lines = e.lines.clone();
                self.created = true;
            }
            JournalEvent::Posted(e) => {
                self.status = EntryStatus::Posted;
                self.posted_date = Some(e.posted_date);
                self.running_total_debit = e.debit_total;
                self.running_total_credit = e.credit_total;
            }
            JournalEvent::Deleted(_) => {
                self.lines.clear();
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalCommand::Create(cmd) => self.handle_create(cmd),
            JournalCommand::Post(cmd) => {
                self.ensure_live()?;
                if self.status == EntryStatus::Posted {
                    return Err(DomainError::invariant("entry is already posted"));
                }
                let (debit_total, credit_total) = LedgerBalanceChecker::check_balanced(&self.lines)?;

                Ok(vec![JournalEvent::Posted(JournalEntryPosted {
                    entry_id: cmd.entry_id,
                    posted_date: cmd.posted_date,
                    debit_total,
                    credit_total,
                    occurred_at: cmd.occurred_at,
                })])
            }
            JournalCommand::Delete(cmd) => {
                self.ensure_live()?;
                if self.status == EntryStatus::Posted {
                    return Err(DomainError::invariant("posted entry cannot be deleted"));
                }
                Ok(vec![JournalEvent::Deleted(JournalEntryDeleted {
                    entry_id: cmd.entry_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for JournalEntry {
    const AGGREGATE_TYPE: &'static str = "gl.journal_entry";

    fn empty(id: JournalEntryId) -> Self {
        JournalEntry::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

impl JournalEntry {
    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("journal entry {}", self.id)));
        }
        if self.deleted {
            return Err(DomainError::invariant("entry is deleted"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateJournalEntry) -> Result<Vec<JournalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("journal entry already exists"));
        }
        if self.id != cmd.entry_id {
            return Err(DomainError::invariant("entry_id mismatch"));
        }
        if cmd.lines.len() < 2 {
            return Err(DomainError::validation(
                "journal entry must have at least two lines",
            ));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("journal entry name cannot be empty"));
        }

        let lines: Vec<JournalLine> = cmd
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| JournalLine {
                sequence: i as u32,
                account_code_id: line.account_code_id,
                debit: line.debit,
                credit: line.credit,
                description: line.description.clone(),
            })
            .collect();
        for line in &lines {
            LedgerBalanceChecker::validate_line(line)?;
        }

        Ok(vec![JournalEvent::Created(JournalEntryCreated {
            entry_id: cmd.entry_id,
            ledger_id: cmd.ledger_id,
            period_id: cmd.period_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            category: cmd.category.clone(),
            currency: cmd.currency.clone(),
            effective_date: cmd.effective_date,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn entry_id() -> JournalEntryId {
        JournalEntryId::from_uuid(Uuid::from_u128(1))
    }

    fn line(account: u128, debit: Decimal, credit: Decimal) -> NewJournalLine {
        NewJournalLine {
            account_code_id: AccountCodeId::from_uuid(Uuid::from_u128(account)),
            debit,
            credit,
            description: None,
        }
    }

    fn create(lines: Vec<NewJournalLine>) -> JournalCommand {
        JournalCommand::Create(CreateJournalEntry {
            entry_id: entry_id(),
            ledger_id: LedgerId::from_uuid(Uuid::from_u128(2)),
            period_id: PeriodId::from_uuid(Uuid::from_u128(3)),
            name: "Accrual".to_string(),
            description: None,
            category: Some("adjustment".to_string()),
            currency: CurrencyCode::parse("USD").unwrap(),
            effective_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            lines,
            occurred_at: Utc::now(),
        })
    }

    fn post() -> JournalCommand {
        JournalCommand::Post(PostJournalEntry {
            entry_id: entry_id(),
            posted_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            occurred_at: Utc::now(),
        })
    }

    fn delete() -> JournalCommand {
        JournalCommand::Delete(DeleteJournalEntry {
            entry_id: entry_id(),
            occurred_at: Utc::now(),
        })
    }

    fn entry_with(lines: Vec<NewJournalLine>) -> JournalEntry {
        let mut entry = JournalEntry::empty(entry_id());
        let events = entry.handle(&create(lines)).unwrap();
        entry.apply(&events[0]);
        entry
    }

    fn run(entry: &mut JournalEntry, command: JournalCommand) -> Result<(), DomainError> {
        for event in entry.handle(&command)? {
            entry.apply(&event);
        }
        Ok(())
    }

    #[test]
    fn single_line_entry_is_rejected() {
        let entry = JournalEntry::empty(entry_id());
        let err = entry.handle(&create(vec![line(10, dec!(100), dec!(0))])).unwrap_err();
        assert_eq!(err, DomainError::validation("journal entry must have at least two lines"));
    }

    #[test]
    fn lines_are_sequenced_in_order() {
        let entry = entry_with(vec![line(10, dec!(100), dec!(0)), line(11, dec!(0), dec!(100))]);
        let sequences: Vec<_> = entry.lines().iter().map(|l| l.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(entry.status(), EntryStatus::Unposted);
    }

    #[test]
    fn balanced_entry_posts_once() {
        let mut entry = entry_with(vec![line(10, dec!(100), dec!(0)), line(11, dec!(0), dec!(100))]);
        run(&mut entry, post()).unwrap();
        assert_eq!(entry.status(), EntryStatus::Posted);
        assert_eq!(entry.running_totals(), (dec!(100), dec!(100)));

        assert_eq!(run(&mut entry, post()), Err(DomainError::invariant("entry is already posted")));
        assert_eq!(
            run(&mut entry, delete()),
            Err(DomainError::invariant("posted entry cannot be deleted"))
        );
        assert_eq!(entry.version(), 2);
    }

    #[test]
    fn unbalanced_entry_does_not_post() {
        let mut entry = entry_with(vec![line(10, dec!(100), dec!(0)), line(11, dec!(0), dec!(90))]);
        assert_eq!(run(&mut entry, post()), Err(DomainError::validation("entry out of balance")));
        assert_eq!(entry.status(), EntryStatus::Unposted);
        assert_eq!(entry.version(), 1);
    }

    #[test]
    fn deleted_entry_cannot_be_posted() {
        let mut entry = entry_with(vec![line(10, dec!(100), dec!(0)), line(11, dec!(0), dec!(100))]);
        run(&mut entry, delete()).unwrap();
        assert!(entry.is_deleted());
        assert_eq!(run(&mut entry, post()), Err(DomainError::invariant("entry is deleted")));
    }

    #[test]
    fn line_with_debit_and_credit_is_rejected() {
        let entry = JournalEntry::empty(entry_id());
        let err = entry
            .handle(&create(vec![line(10, dec!(100), dec!(100)), line(11, dec!(0), dec!(0))]))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("both a debit and a credit")));
    }
}

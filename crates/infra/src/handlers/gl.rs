//! General ledger handlers.
//!
//! Posting touches two aggregates. The entry's `Posted` event is saved first,
//! which also closes it to deletion; the ledger's roll-up follows. When that
//! second save fails, resubmitting the post finishes the roll-up. The ledger
//! remembers which entries it has recorded, so nothing counts twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tally_core::{AggregateRoot, CurrencyCode, IdGenerator};
use tally_gl::{
    AccountCodeGenerator, Calendar, CalendarCommand, CalendarId, CreateCalendar, CreateJournalEntry,
    CreateLedger, CreateStructure, DeleteJournalEntry, EntryStatus, JournalCommand, JournalEntry,
    Ledger, LedgerCommand, LedgerId, LedgerPeriod, PeriodId, PostJournalEntry, RecordChartOfAccounts,
    RecordPosting, Structure, StructureCommand, StructureId,
};

use crate::config::Settings;
use crate::directory::{CalendarDirectory, StructureDirectory};
use crate::error::CommandError;
use crate::event_store::EventStore;
use crate::handlers::logged;
use crate::repository::{AggregateRepository, Tracked};

pub struct StructureHandler<S> {
    structures: AggregateRepository<S, Structure>,
    ids: Arc<dyn IdGenerator>,
    directory: Arc<dyn StructureDirectory>,
    separator: String,
}

impl<S: EventStore> StructureHandler<S> {
    pub fn new(
        store: S,
        ids: Arc<dyn IdGenerator>,
        directory: Arc<dyn StructureDirectory>,
        settings: &Settings,
    ) -> Self {
        Self {
            structures: AggregateRepository::new(store, Arc::clone(&ids)),
            ids,
            directory,
            separator: settings.account_separator.clone(),
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, Structure> {
        &self.structures
    }

    pub fn create(&self, cmd: CreateStructure) -> Result<Tracked<Structure>, CommandError> {
        let id = cmd.structure_id;
        logged("gl.structure.create", id, self.try_create(cmd))
    }

    /// Run any other structure command (segments, values, status changes).
    pub fn dispatch(
        &self,
        structure_id: StructureId,
        command: StructureCommand,
    ) -> Result<Tracked<Structure>, CommandError> {
        logged(
            "gl.structure.update",
            structure_id,
            self.structures.dispatch(structure_id, command),
        )
    }

    /// Generate the full chart of accounts and record it on the structure.
    pub fn generate_chart(
        &self,
        structure_id: StructureId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Tracked<Structure>, CommandError> {
        logged(
            "gl.structure.generate_chart",
            structure_id,
            self.try_generate_chart(structure_id, occurred_at),
        )
    }

    fn try_create(&self, cmd: CreateStructure) -> Result<Tracked<Structure>, CommandError> {
        let id = cmd.structure_id;
        if let Some(existing) = self.directory.structure_named(&cmd.name)? {
            if existing != id {
                return Err(CommandError::Validation(format!(
                    "structure name '{}' is already used",
                    cmd.name.trim()
                )));
            }
        }
        let tracked = self.structures.create(id, StructureCommand::Create(cmd))?;
        self.directory.record_structure(tracked.name(), id)?;
        Ok(tracked)
    }

    fn try_generate_chart(
        &self,
        structure_id: StructureId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Tracked<Structure>, CommandError> {
        let mut tracked = self.structures.load(structure_id)?;
        let codes = AccountCodeGenerator::with_separator(tracked.aggregate(), self.separator.as_str())
            .generate(&*self.ids)?;
        tracing::debug!(
            structure_id = %structure_id,
            codes = codes.len(),
            "chart of accounts generated"
        );
        tracked.execute(StructureCommand::RecordChartOfAccounts(RecordChartOfAccounts {
            structure_id,
            codes,
            occurred_at,
        }))?;
        self.structures.save(&mut tracked)?;
        Ok(tracked)
    }
}

pub struct CalendarHandler<S> {
    calendars: AggregateRepository<S, Calendar>,
    directory: Arc<dyn CalendarDirectory>,
}

impl<S: EventStore> CalendarHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>, directory: Arc<dyn CalendarDirectory>) -> Self {
        Self {
            calendars: AggregateRepository::new(store, ids),
            directory,
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, Calendar> {
        &self.calendars
    }

    /// Create a calendar under a name no other calendar uses.
    pub fn create(&self, cmd: CreateCalendar) -> Result<Tracked<Calendar>, CommandError> {
        let id = cmd.calendar_id;
        logged("gl.calendar.create", id, self.try_create(cmd))
    }

    fn try_create(&self, cmd: CreateCalendar) -> Result<Tracked<Calendar>, CommandError> {
        let id = cmd.calendar_id;
        if let Some(existing) = self.directory.calendar_named(&cmd.name)? {
            if existing != id {
                return Err(CommandError::Validation(format!(
                    "calendar name '{}' is already used",
                    cmd.name.trim()
                )));
            }
        }
        let tracked = self.calendars.create(id, CalendarCommand::Create(cmd))?;
        self.directory.record_calendar(tracked.name(), id)?;
        Ok(tracked)
    }
}

/// Ledger creation request. Accounts are named by code and resolved against
/// the structure's generated chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedger {
    pub ledger_id: LedgerId,
    pub name: String,
    pub short_name: String,
    pub description: Option<String>,
    pub currency: CurrencyCode,
    pub calendar_id: CalendarId,
    pub structure_id: StructureId,
    pub retained_earnings_code: String,
    pub net_income_code: String,
    pub occurred_at: DateTime<Utc>,
}

pub struct LedgerHandler<S> {
    ledgers: AggregateRepository<S, Ledger>,
    calendars: AggregateRepository<S, Calendar>,
    structures: AggregateRepository<S, Structure>,
}

impl<S: EventStore + Clone> LedgerHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            ledgers: AggregateRepository::new(store.clone(), Arc::clone(&ids)),
            calendars: AggregateRepository::new(store.clone(), Arc::clone(&ids)),
            structures: AggregateRepository::new(store, ids),
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, Ledger> {
        &self.ledgers
    }

    /// Create a ledger with a zero balance for every account in every period.
    pub fn create(&self, request: NewLedger) -> Result<Tracked<Ledger>, CommandError> {
        let id = request.ledger_id;
        logged("gl.ledger.create", id, self.try_create(request))
    }

    fn try_create(&self, request: NewLedger) -> Result<Tracked<Ledger>, CommandError> {
        let calendar = self.calendars.load(request.calendar_id)?;
        let structure = self.structures.load(request.structure_id)?;

        let account = |code: &str| {
            structure
                .account_code(code)
                .map(|a| a.id)
                .ok_or_else(|| {
                    CommandError::NotFound(format!(
                        "account code {code} in structure {}",
                        structure.id()
                    ))
                })
        };
        let retained_earnings_account = account(&request.retained_earnings_code)?;
        let net_income_account = account(&request.net_income_code)?;

        let cmd = CreateLedger {
            ledger_id: request.ledger_id,
            name: request.name,
            short_name: request.short_name,
            description: request.description,
            currency: request.currency,
            calendar_id: request.calendar_id,
            structure_id: request.structure_id,
            retained_earnings_account,
            net_income_account,
            account_codes: structure.chart_of_accounts().iter().map(|a| a.id).collect(),
            periods: calendar
                .periods()
                .iter()
                .map(|p| LedgerPeriod {
                    period_id: p.period_id,
                    period_year: p.period_year,
                    period_num: p.period_num,
                })
                .collect(),
            occurred_at: request.occurred_at,
        };
        self.ledgers.create(request.ledger_id, LedgerCommand::Create(cmd))
    }
}

pub struct JournalHandler<S> {
    entries: AggregateRepository<S, JournalEntry>,
    ledgers: AggregateRepository<S, Ledger>,
}

impl<S: EventStore + Clone> JournalHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            entries: AggregateRepository::new(store.clone(), Arc::clone(&ids)),
            ledgers: AggregateRepository::new(store, ids),
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, JournalEntry> {
        &self.entries
    }

    /// Create an unposted entry. Every line must hit an account the ledger
    /// keeps a balance for in the entry's period.
    pub fn create(&self, cmd: CreateJournalEntry) -> Result<Tracked<JournalEntry>, CommandError> {
        let id = cmd.entry_id;
        logged("gl.journal_entry.create", id, self.try_create(cmd))
    }

    /// Post the entry and roll its lines up into the ledger balances.
    pub fn post(&self, cmd: PostJournalEntry) -> Result<Tracked<JournalEntry>, CommandError> {
        let id = cmd.entry_id;
        logged("gl.journal_entry.post", id, self.try_post(cmd))
    }

    pub fn delete(&self, cmd: DeleteJournalEntry) -> Result<Tracked<JournalEntry>, CommandError> {
        let id = cmd.entry_id;
        logged(
            "gl.journal_entry.delete",
            id,
            self.entries.dispatch(id, JournalCommand::Delete(cmd)),
        )
    }

    fn try_create(&self, cmd: CreateJournalEntry) -> Result<Tracked<JournalEntry>, CommandError> {
        let ledger = self.ledgers.load(cmd.ledger_id)?;
        if let Some(line) = cmd
            .lines
            .iter()
            .find(|line| ledger.balance(line.account_code_id, cmd.period_id).is_none())
        {
            return Err(CommandError::Validation(format!(
                "ledger {} has no balance for account {} in period {}",
                cmd.ledger_id, line.account_code_id, cmd.period_id
            )));
        }
        self.entries.create(cmd.entry_id, JournalCommand::Create(cmd))
    }

    fn try_post(&self, cmd: PostJournalEntry) -> Result<Tracked<JournalEntry>, CommandError> {
        let entry_id = cmd.entry_id;
        let occurred_at = cmd.occurred_at;
        let mut entry = self.entries.load(entry_id)?;
        let (ledger_id, period_id) = match (entry.ledger_id(), entry.period_id()) {
            (Some(ledger_id), Some(period_id)) => (ledger_id, period_id),
            _ => {
                return Err(CommandError::InvariantViolation(format!(
                    "journal entry {entry_id} has no ledger period"
                )));
            }
        };
        let mut ledger = self.ledgers.load(ledger_id)?;

        // Posted on an earlier attempt whose roll-up never landed.
        if entry.status() == EntryStatus::Posted && !ledger.has_recorded(entry_id) {
            record_posting(&mut ledger, &entry, ledger_id, period_id, occurred_at)?;
            self.ledgers.save(&mut ledger)?;
            return Ok(entry);
        }

        entry.execute(JournalCommand::Post(cmd))?;
        record_posting(&mut ledger, &entry, ledger_id, period_id, occurred_at)?;

        self.entries.save(&mut entry)?;
        self.ledgers.save(&mut ledger)?;
        Ok(entry)
    }
}

fn record_posting(
    ledger: &mut Tracked<Ledger>,
    entry: &JournalEntry,
    ledger_id: LedgerId,
    period_id: PeriodId,
    occurred_at: DateTime<Utc>,
) -> Result<(), CommandError> {
    ledger.execute(LedgerCommand::RecordPosting(RecordPosting {
        ledger_id,
        entry_id: *entry.id(),
        period_id,
        postings: entry.postings(),
        occurred_at,
    }))?;
    Ok(())
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, CurrencyCode, DomainError, EventSourced};
use tally_events::Event;

use crate::balance_checker::{LedgerBalanceChecker, Posting};
use crate::calendar::{CalendarId, Period, PeriodId};
use crate::journal::JournalEntryId;
use crate::structure::{AccountCodeId, StructureId};

tally_core::uuid_id!(
    /// Ledger identifier (aggregate id).
    pub LedgerId
);

/// Key of one account balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub ledger_id: LedgerId,
    pub account_code_id: AccountCodeId,
    pub period_id: PeriodId,
}

/// Period-net activity of one account in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub key: BalanceKey,
    pub period_year: i32,
    pub period_num: u32,
    pub period_net_debit: Decimal,
    pub period_net_credit: Decimal,
    pub beginning_balance_debit: Decimal,
    pub beginning_balance_credit: Decimal,
}

impl AccountBalance {
    /// Zero balance created with the ledger.
    pub fn opening(key: BalanceKey, period_year: i32, period_num: u32) -> Self {
        Self {
            key,
            period_year,
            period_num,
            period_net_debit: Decimal::ZERO,
            period_net_credit: Decimal::ZERO,
            beginning_balance_debit: Decimal::ZERO,
            beginning_balance_credit: Decimal::ZERO,
        }
    }

    /// Debit minus credit for the period.
    pub fn period_net(&self) -> Decimal {
        self.period_net_debit - self.period_net_credit
    }
}

/// The calendar period facts a ledger needs to open its balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPeriod {
    pub period_id: PeriodId,
    pub period_year: i32,
    pub period_num: u32,
}

impl From<&Period> for LedgerPeriod {
    fn from(period: &Period) -> Self {
        Self {
            period_id: period.period_id,
            period_year: period.period_year,
            period_num: period.period_num,
        }
    }
}

/// Aggregate root: Ledger (balances of a chart of accounts over a calendar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    name: String,
    short_name: String,
    description: Option<String>,
    currency: Option<CurrencyCode>,
    calendar_id: Option<CalendarId>,
    structure_id: Option<StructureId>,
    retained_earnings_account: Option<AccountCodeId>,
    net_income_account: Option<AccountCodeId>,
    balances: BTreeMap<BalanceKey, AccountBalance>,
    posted_entries: BTreeSet<JournalEntryId>,
    version: u64,
    created: bool,
}

impl Ledger {
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            name: String::new(),
            short_name: String::new(),
            description: None,
            currency: None,
            calendar_id: None,
            structure_id: None,
            retained_earnings_account: None,
            net_income_account: None,
            balances: BTreeMap::new(),
            posted_entries: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn currency(&self) -> Option<&CurrencyCode> {
        self.currency.as_ref()
    }

    pub fn calendar_id(&self) -> Option<CalendarId> {
        self.calendar_id
    }

    pub fn structure_id(&self) -> Option<StructureId> {
        self.structure_id
    }

    pub fn retained_earnings_account(&self) -> Option<AccountCodeId> {
        self.retained_earnings_account
    }

    pub fn net_income_account(&self) -> Option<AccountCodeId> {
        self.net_income_account
    }

    pub fn balance(&self, account_code_id: AccountCodeId, period_id: PeriodId) -> Option<&AccountBalance> {
        self.balances.get(&self.key(account_code_id, period_id))
    }

    pub fn balances(&self) -> impl Iterator<Item = &AccountBalance> {
        self.balances.values()
    }

    pub fn has_recorded(&self, entry_id: JournalEntryId) -> bool {
        self.posted_entries.contains(&entry_id)
    }

    fn key(&self, account_code_id: AccountCodeId, period_id: PeriodId) -> BalanceKey {
        BalanceKey {
            ledger_id: self.id,
            account_code_id,
            period_id,
        }
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateLedger.
///
/// `account_codes` and `periods` are the structure's generated chart and the
/// calendar's periods; one zero balance is opened for every pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLedger {
    pub ledger_id: LedgerId,
    pub name: String,
    pub short_name: String,
    pub description: Option<String>,
    pub currency: CurrencyCode,
    pub calendar_id: CalendarId,
    pub structure_id: StructureId,
    pub retained_earnings_account: AccountCodeId,
    pub net_income_account: AccountCodeId,
    pub account_codes: Vec<AccountCodeId>,
    pub periods: Vec<LedgerPeriod>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPosting (roll a posted journal entry into the balances).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPosting {
    pub ledger_id: LedgerId,
    pub entry_id: JournalEntryId,
    pub period_id: PeriodId,
    pub postings: Vec<Posting>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Create(CreateLedger),
    RecordPosting(RecordPosting),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCreated {
    pub ledger_id: LedgerId,
    pub name: String,
    pub short_name: String,
    pub description: Option<String>,
    pub currency: CurrencyCode,
    pub calendar_id: CalendarId,
    pub structure_id: StructureId,
    pub retained_earnings_account: AccountCodeId,
    pub net_income_account: AccountCodeId,
    pub account_codes: Vec<AccountCodeId>,
    pub periods: Vec<LedgerPeriod>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRecorded {
    pub ledger_id: LedgerId,
    pub entry_id: JournalEntryId,
    pub period_id: PeriodId,
    pub postings: Vec<Posting>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Created(LedgerCreated),
    PostingRecorded(PostingRecorded),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::Created(_) => "gl.ledger.created",
            LedgerEvent::PostingRecorded(_) => "gl.ledger.posting_recorded",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::Created(e) => e.occurred_at,
            LedgerEvent::PostingRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::Created(e) => {
                self.id = e.ledger_id;
                self.name = e.name.clone();
                self.short_name = e.short_name.clone();
                self.description = e.description.clone();
                self.currency = Some(e.currency.clone());
                self.calendar_id = Some(e.calendar_id);
                self.structure_id = Some(e.structure_id);
                self.retained_earnings_account = Some(e.retained_earnings_account);
                self.net_income_account = Some(e.net_income_account);
                self.balances.clear();
                for account_code_id in &e.account_codes {
                    for period in &e.periods {
                        let key = self.key(*account_code_id, period.period_id);
                        self.balances.insert(
                            key,
                            AccountBalance::opening(key, period.period_year, period.period_num),
                        );
                    }
                }
                self.created = true;
            }
            LedgerEvent::PostingRecorded(e) => {
                for posting in &e.postings {
                    let key = self.key(posting.account_code_id, e.period_id);
                    if let Some(balance) = self.balances.get_mut(&key) {
                        LedgerBalanceChecker::roll_up(balance, posting);
                    }
                }
                self.posted_entries.insert(e.entry_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Create(cmd) => self.handle_create(cmd),
            LedgerCommand::RecordPosting(cmd) => self.handle_record_posting(cmd),
        }
    }
}

impl EventSourced for Ledger {
    const AGGREGATE_TYPE: &'static str = "gl.ledger";

    fn empty(id: LedgerId) -> Self {
        Ledger::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

impl Ledger {
    fn handle_create(&self, cmd: &CreateLedger) -> Result<Vec<LedgerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("ledger already exists"));
        }
        if self.id != cmd.ledger_id {
            return Err(DomainError::invariant("ledger_id mismatch"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("ledger name cannot be empty"));
        }
        if cmd.short_name.trim().is_empty() {
            return Err(DomainError::validation("ledger short name cannot be empty"));
        }
        if cmd.account_codes.is_empty() {
            return Err(DomainError::validation(
                "structure has no generated chart of accounts",
            ));
        }
        if cmd.periods.is_empty() {
            return Err(DomainError::validation("calendar has no periods"));
        }
        for (label, account) in [
            ("retained earnings", cmd.retained_earnings_account),
            ("net income", cmd.net_income_account),
        ] {
            if !cmd.account_codes.contains(&account) {
                return Err(DomainError::validation(format!(
                    "{label} account is not in the chart of accounts"
                )));
            }
        }

        Ok(vec![LedgerEvent::Created(LedgerCreated {
            ledger_id: cmd.ledger_id,
            name: cmd.name.trim().to_string(),
            short_name: cmd.short_name.trim().to_string(),
            description: cmd.description.clone(),
            currency: cmd.currency.clone(),
            calendar_id: cmd.calendar_id,
            structure_id: cmd.structure_id,
            retained_earnings_account: cmd.retained_earnings_account,
            net_income_account: cmd.net_income_account,
            account_codes: cmd.account_codes.clone(),
            periods: cmd.periods.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_posting(&self, cmd: &RecordPosting) -> Result<Vec<LedgerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("ledger {}", self.id)));
        }
        if self.id != cmd.ledger_id {
            return Err(DomainError::invariant("ledger_id mismatch"));
        }
        // Already rolled up: a retried post converges without double counting.
        if self.posted_entries.contains(&cmd.entry_id) {
            return Ok(Vec::new());
        }
        for posting in &cmd.postings {
            let key = self.key(posting.account_code_id, cmd.period_id);
            if !self.balances.contains_key(&key) {
                return Err(DomainError::validation(format!(
                    "no account balance for account {} in period {}",
                    posting.account_code_id, cmd.period_id
                )));
            }
        }

        Ok(vec![LedgerEvent::PostingRecorded(PostingRecorded {
            ledger_id: cmd.ledger_id,
            entry_id: cmd.entry_id,
            period_id: cmd.period_id,
            postings: cmd.postings.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

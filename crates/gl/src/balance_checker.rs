//! Double-entry enforcement and period balance roll-up.
//!
//! Amounts are `Decimal`; debit and credit totals must be exactly equal, with
//! no rounding tolerance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_core::{DomainError, DomainResult};

use crate::journal::JournalLine;
use crate::ledger::AccountBalance;
use crate::structure::AccountCodeId;

/// Amount rolled into one account balance for one journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub account_code_id: AccountCodeId,
    pub debit: Decimal,
    pub credit: Decimal,
}

pub struct LedgerBalanceChecker;

impl LedgerBalanceChecker {
    /// A line carries a debit or a credit, never both and never negative.
    pub fn validate_line(line: &JournalLine) -> DomainResult<()> {
        if line.debit.is_sign_negative() || line.credit.is_sign_negative() {
            return Err(DomainError::validation(format!(
                "line {}: amounts cannot be negative",
                line.sequence
            )));
        }
        if !line.debit.is_zero() && !line.credit.is_zero() {
            return Err(DomainError::validation(format!(
                "line {}: a line cannot carry both a debit and a credit",
                line.sequence
            )));
        }
        Ok(())
    }

    /// `(debit_total, credit_total)`.
    pub fn totals(lines: &[JournalLine]) -> (Decimal, Decimal) {
        lines.iter().fold((Decimal::ZERO, Decimal::ZERO), |(debit, credit), line| {
            (debit + line.debit, credit + line.credit)
        })
    }

    /// Recompute the totals and reject an unbalanced entry.
    pub fn check_balanced(lines: &[JournalLine]) -> DomainResult<(Decimal, Decimal)> {
        let (debit, credit) = Self::totals(lines);
        if debit != credit {
            return Err(DomainError::validation("entry out of balance"));
        }
        Ok((debit, credit))
    }

    /// One posting per line, in line order.
    pub fn postings(lines: &[JournalLine]) -> Vec<Posting> {
        lines
            .iter()
            .map(|line| Posting {
                account_code_id: line.account_code_id,
                debit: line.debit,
                credit: line.credit,
            })
            .collect()
    }

    /// Add a posting into a balance's period-net accumulators.
    pub fn roll_up(balance: &mut AccountBalance, posting: &Posting) {
        balance.period_net_debit += posting.debit;
        balance.period_net_credit += posting.credit;
    }
}

//! Flattened transaction rows
//!
//! Reading transactions back joins transactions, entries and both accounts,
//! which yields one row per entry with the transaction fields repeated.
//! [`fold_rows`] turns that stream back into nested transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Entry, EntryDirection, Transaction, TransactionKind};

/// One joined row: a transaction, one of its entries, and the usernames of
/// the entry's owner and counterparty
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEntryRow {
    pub transaction_id: Uuid,
    pub kind: TransactionKind,
    pub transaction_created_at: DateTime<Utc>,
    pub transaction_updated_at: DateTime<Utc>,
    pub entry_id: Uuid,
    pub account_id: Uuid,
    pub target_account_id: Option<Uuid>,
    pub direction: EntryDirection,
    pub credit: Decimal,
    pub debit: Decimal,
    pub entry_created_at: DateTime<Utc>,
    pub entry_updated_at: DateTime<Utc>,
    pub account_username: String,
    pub target_username: Option<String>,
}

impl TransactionEntryRow {
    fn header(&self) -> Transaction {
        Transaction {
            id: self.transaction_id,
            kind: self.kind,
            created_at: self.transaction_created_at,
            updated_at: self.transaction_updated_at,
            entries: Vec::new(),
        }
    }

    fn into_entry(self) -> Entry {
        Entry {
            id: self.entry_id,
            transaction_id: self.transaction_id,
            account_id: self.account_id,
            target_account_id: self.target_account_id,
            direction: self.direction,
            credit: self.credit,
            debit: self.debit,
            created_at: self.entry_created_at,
            updated_at: self.entry_updated_at,
            account_username: self.account_username,
            target_username: self.target_username,
        }
    }
}

/// Fold joined rows into transactions, keyed by transaction id.
///
/// Only consecutive rows are merged: the producing query MUST order its rows
/// so that all rows of one transaction are contiguous (for instance
/// `ORDER BY t.created_at DESC, t.id`). Output order follows the first row of
/// each transaction.
pub fn fold_rows<I>(rows: I) -> Vec<Transaction>
where
    I: IntoIterator<Item = TransactionEntryRow>,
{
    let mut transactions: Vec<Transaction> = Vec::new();

    for row in rows {
        match transactions.last_mut() {
            Some(current) if current.id == row.transaction_id => {
                current.entries.push(row.into_entry());
            }
            _ => {
                let mut transaction = row.header();
                transaction.entries.push(row.into_entry());
                transactions.push(transaction);
            }
        }
    }

    transactions
}

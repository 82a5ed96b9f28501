//! Payment view
//!
//! Counterparty-oriented projection of `payment` transactions: who paid whom
//! and in which direction. Purely derived, never persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::{Entry, EntryDirection, Transaction, TransactionKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub name: TransactionKind,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<PaymentEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentEntry {
    #[serde(rename = "account")]
    pub username: String,
    /// Always positive, whichever side of the payment this is
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    pub direction: EntryDirection,
}

impl From<&Entry> for PaymentEntry {
    fn from(entry: &Entry) -> Self {
        match entry.direction {
            EntryDirection::Incoming => PaymentEntry {
                username: entry.account_username.clone(),
                amount: entry.credit.normalize(),
                to_account: None,
                from_account: entry.target_username.clone(),
                direction: EntryDirection::Incoming,
            },
            EntryDirection::Outgoing => PaymentEntry {
                username: entry.account_username.clone(),
                amount: entry.debit.abs().normalize(),
                to_account: entry.target_username.clone(),
                from_account: None,
                direction: EntryDirection::Outgoing,
            },
        }
    }
}

impl From<&Transaction> for Payment {
    fn from(transaction: &Transaction) -> Self {
        Payment {
            id: transaction.id,
            name: transaction.kind,
            created_at: transaction.created_at,
            updated_at: transaction.updated_at,
            entries: transaction.entries.iter().map(PaymentEntry::from).collect(),
        }
    }
}

/// Map a batch of transactions, preserving order
pub fn to_payments(transactions: &[Transaction]) -> Vec<Payment> {
    transactions.iter().map(Payment::from).collect()
}

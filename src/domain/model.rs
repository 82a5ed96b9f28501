//! Ledger model
//!
//! Accounts, transactions and their signed entries. An account's balance is
//! never stored; it is whatever its entries sum to.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, LedgerError};

/// Closed set of transaction names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Payment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Payment => "payment",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "payment" => Ok(TransactionKind::Payment),
            other => Err(LedgerError::Storage(format!(
                "unknown transaction name '{}'",
                other
            ))),
        }
    }
}

/// Direction of an entry from its owning account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Incoming,
    Outgoing,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Incoming => "incoming",
            EntryDirection::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryDirection {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(EntryDirection::Incoming),
            "outgoing" => Ok(EntryDirection::Outgoing),
            other => Err(LedgerError::Storage(format!(
                "unknown entry name '{}'",
                other
            ))),
        }
    }
}

/// A wallet account.
///
/// `balance` is filled in by the account store from the sum of the account's
/// entries and is ignored on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub currency: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// New account with no entries yet
    pub fn new(username: impl Into<String>, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            currency: currency.into(),
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One signed line of a transaction.
///
/// `account_username` and `target_username` are resolved by join when
/// entries are read back; they are never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    /// Counterparty account, if any
    pub target_account_id: Option<Uuid>,
    pub direction: EntryDirection,
    /// Always >= 0
    pub credit: Decimal,
    /// Always <= 0
    pub debit: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub account_username: String,
    pub target_username: Option<String>,
}

impl Entry {
    /// Money arriving at `account`, optionally from `source`
    pub fn incoming(
        transaction_id: Uuid,
        account: &Account,
        amount: Amount,
        source: Option<&Account>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_id: account.id,
            target_account_id: source.map(|a| a.id),
            direction: EntryDirection::Incoming,
            credit: amount.value(),
            debit: Decimal::ZERO,
            created_at: at,
            updated_at: at,
            account_username: account.username.clone(),
            target_username: source.map(|a| a.username.clone()),
        }
    }

    /// Money leaving `account` towards `target`
    pub fn outgoing(
        transaction_id: Uuid,
        account: &Account,
        amount: Amount,
        target: &Account,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_id: account.id,
            target_account_id: Some(target.id),
            direction: EntryDirection::Outgoing,
            credit: Decimal::ZERO,
            debit: amount.negated(),
            created_at: at,
            updated_at: at,
            account_username: account.username.clone(),
            target_username: Some(target.username.clone()),
        }
    }

    /// Signed effect of this entry on its account's balance
    pub fn net(&self) -> Decimal {
        self.credit + self.debit
    }

    /// `incoming` carries only a positive credit, `outgoing` only a negative debit
    pub fn has_valid_shape(&self) -> bool {
        match self.direction {
            EntryDirection::Incoming => self.credit > Decimal::ZERO && self.debit.is_zero(),
            EntryDirection::Outgoing => self.debit < Decimal::ZERO && self.credit.is_zero(),
        }
    }
}

/// An immutable ledger transaction and its entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
}

impl Transaction {
    fn empty(kind: TransactionKind, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            created_at: at,
            updated_at: at,
            entries: Vec::new(),
        }
    }

    /// External money entering `account`: a single incoming entry, no counterparty
    pub fn deposit(account: &Account, amount: Amount) -> Self {
        let now = Utc::now();
        let mut transaction = Self::empty(TransactionKind::Deposit, now);
        transaction
            .entries
            .push(Entry::incoming(transaction.id, account, amount, None, now));
        transaction
    }

    /// Transfer from `sender` to `receiver`: outgoing debit plus matching incoming credit
    pub fn payment(sender: &Account, receiver: &Account, amount: Amount) -> Self {
        let now = Utc::now();
        let mut transaction = Self::empty(TransactionKind::Payment, now);
        let id = transaction.id;
        transaction.entries = vec![
            Entry::outgoing(id, sender, amount, receiver, now),
            Entry::incoming(id, receiver, amount, Some(sender), now),
        ];
        transaction
    }

    /// Sum of `credit + debit` over all entries
    pub fn net_amount(&self) -> Decimal {
        self.entries.iter().map(Entry::net).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.net_amount().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account(name: &str) -> Account {
        Account::new(name, "USD")
    }

    #[test]
    fn test_new_account_has_zero_balance() {
        let alice = account("alice");
        assert!(alice.balance.is_zero());
        assert_eq!(alice.currency, "USD");
        assert_ne!(alice.id, Uuid::nil());
    }

    #[test]
    fn test_deposit_is_single_incoming_entry() {
        let alice = account("alice");
        let amount = Amount::new(dec!(200.00)).unwrap();
        let deposit = Transaction::deposit(&alice, amount);

        assert_eq!(deposit.kind, TransactionKind::Deposit);
        assert_eq!(deposit.entries.len(), 1);

        let entry = &deposit.entries[0];
        assert_eq!(entry.transaction_id, deposit.id);
        assert_eq!(entry.account_id, alice.id);
        assert_eq!(entry.direction, EntryDirection::Incoming);
        assert_eq!(entry.credit, dec!(200));
        assert!(entry.debit.is_zero());
        assert!(entry.target_account_id.is_none());
        assert!(entry.has_valid_shape());
    }

    #[test]
    fn test_payment_conserves_amount() {
        let bob = account("bob");
        let alice = account("alice");
        let payment = Transaction::payment(&bob, &alice, Amount::new(dec!(100)).unwrap());

        assert_eq!(payment.kind, TransactionKind::Payment);
        assert_eq!(payment.entries.len(), 2);
        assert!(payment.is_balanced());

        let outgoing = &payment.entries[0];
        let incoming = &payment.entries[1];
        assert_eq!(outgoing.direction, EntryDirection::Outgoing);
        assert_eq!(outgoing.account_id, bob.id);
        assert_eq!(outgoing.target_account_id, Some(alice.id));
        assert_eq!(outgoing.debit, dec!(-100));
        assert_eq!(incoming.direction, EntryDirection::Incoming);
        assert_eq!(incoming.account_id, alice.id);
        assert_eq!(incoming.target_account_id, Some(bob.id));
        assert_eq!(incoming.credit, -outgoing.debit);
        assert!(payment
            .entries
            .iter()
            .all(|e| e.transaction_id == payment.id && e.has_valid_shape()));
    }

    #[test]
    fn test_entry_shape_rejects_wrong_sign() {
        let alice = account("alice");
        let mut entry = Entry::incoming(
            Uuid::new_v4(),
            &alice,
            Amount::new(dec!(5)).unwrap(),
            None,
            Utc::now(),
        );
        entry.debit = dec!(-1);
        assert!(!entry.has_valid_shape());

        entry.debit = Decimal::ZERO;
        entry.direction = EntryDirection::Outgoing;
        assert!(!entry.has_valid_shape());
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!("payment".parse::<TransactionKind>().unwrap(), TransactionKind::Payment);
        assert_eq!(TransactionKind::Deposit.to_string(), "deposit");
        assert!("refund".parse::<TransactionKind>().is_err());

        assert_eq!("outgoing".parse::<EntryDirection>().unwrap(), EntryDirection::Outgoing);
        assert!("sideways".parse::<EntryDirection>().is_err());
        assert_eq!(
            serde_json::to_string(&EntryDirection::Incoming).unwrap(),
            "\"incoming\""
        );
    }
}

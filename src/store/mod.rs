//! Ledger storage
//!
//! Contracts the ledger service drives, plus a PostgreSQL implementation and
//! an in-process one with the same semantics.
//!
//! Every call takes the unit of work it runs in. A unit of work is consumed by
//! `commit` or `rollback`, so it cannot be reused past either terminal state;
//! dropping it without either discards its writes.

mod memory;
mod postgres;
pub mod rows;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Account, Entry, LedgerError, LedgerResult, Transaction, TransactionKind};

pub use memory::{MemoryLedgerStore, MemoryUnitOfWork};
pub use postgres::{PgLedgerStore, PgUnitOfWork, DEFAULT_SCHEMA};

/// Atomic, all-or-nothing scope bounding a set of storage reads and writes
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    async fn commit(self) -> LedgerResult<()>;

    async fn rollback(self) -> LedgerResult<()>;
}

/// Accounts and their derived balances
#[async_trait]
pub trait AccountStore: Send + Sync {
    type Unit: UnitOfWork;

    /// All accounts ordered by username ascending; balance is the sum of
    /// `credit + debit` over each account's entries, zero when it has none.
    async fn list_accounts(&self, unit: &mut Self::Unit) -> LedgerResult<Vec<Account>>;

    /// Fails with `AccountNotFound` when no account has this username
    async fn get_account_by_username(
        &self,
        unit: &mut Self::Unit,
        username: &str,
    ) -> LedgerResult<Account>;

    /// Fails with `UsernameTaken` when the username already exists
    async fn create_account(&self, unit: &mut Self::Unit, account: &Account) -> LedgerResult<()>;
}

/// Append-only transactions and entries
#[async_trait]
pub trait LedgerStore: AccountStore {
    /// Open a unit of work bound to the ledger's namespace
    async fn begin_unit_of_work(&self) -> LedgerResult<Self::Unit>;

    /// Exclusive lock over the whole transaction ledger, held until the unit
    /// of work commits or rolls back. Blocks while another unit holds it.
    /// Must precede any write that depends on a derived balance.
    async fn lock_transactions(&self, unit: &mut Self::Unit) -> LedgerResult<()>;

    /// Insert the transaction row only; entries go through `create_entries`
    async fn create_transaction(
        &self,
        unit: &mut Self::Unit,
        transaction: &Transaction,
    ) -> LedgerResult<()>;

    /// Insert all entries as one batch after [`validate_entries`] passes.
    /// Nothing is written when validation fails.
    async fn create_entries(
        &self,
        unit: &mut Self::Unit,
        transaction_id: Uuid,
        entries: &[Entry],
    ) -> LedgerResult<()>;

    /// All transactions of `kind`, most recent first, each with its entries
    /// and the usernames on both sides. Empty when none exist.
    async fn get_transactions_by_name(
        &self,
        unit: &mut Self::Unit,
        kind: TransactionKind,
    ) -> LedgerResult<Vec<Transaction>>;
}

/// Check a batch of entries before anything is written.
///
/// Every entry must belong to `transaction_id` (`EntryMismatch`), and only
/// then is each entry's direction checked against its amounts
/// (`MalformedEntry`).
pub fn validate_entries(transaction_id: Uuid, entries: &[Entry]) -> LedgerResult<()> {
    if let Some(stray) = entries.iter().find(|e| e.transaction_id != transaction_id) {
        return Err(LedgerError::EntryMismatch {
            entry_id: stray.id,
            expected: transaction_id,
            found: stray.transaction_id,
        });
    }

    if let Some(malformed) = entries.iter().find(|e| !e.has_valid_shape()) {
        return Err(LedgerError::MalformedEntry {
            entry_id: malformed.id,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_entries_accepts_payment() {
        let bob = Account::new("bob", "USD");
        let alice = Account::new("alice", "USD");
        let payment = Transaction::payment(&bob, &alice, Amount::new(dec!(10)).unwrap());

        assert!(validate_entries(payment.id, &payment.entries).is_ok());
        assert!(validate_entries(payment.id, &[]).is_ok());
    }

    #[test]
    fn test_validate_entries_rejects_foreign_entry() {
        let alice = Account::new("alice", "USD");
        let deposit = Transaction::deposit(&alice, Amount::new(dec!(10)).unwrap());
        let other = Uuid::new_v4();

        let err = validate_entries(other, &deposit.entries).unwrap_err();
        match err {
            LedgerError::EntryMismatch {
                entry_id,
                expected,
                found,
            } => {
                assert_eq!(entry_id, deposit.entries[0].id);
                assert_eq!(expected, other);
                assert_eq!(found, deposit.id);
            }
            e => panic!("Expected EntryMismatch, got: {:?}", e),
        }
    }

    #[test]
    fn test_validate_entries_mismatch_checked_before_shape() {
        let alice = Account::new("alice", "USD");
        let mut deposit = Transaction::deposit(&alice, Amount::new(dec!(10)).unwrap());
        deposit.entries[0].credit = Decimal::ZERO;

        let err = validate_entries(Uuid::new_v4(), &deposit.entries).unwrap_err();
        assert!(matches!(err, LedgerError::EntryMismatch { .. }));

        let err = validate_entries(deposit.id, &deposit.entries).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedEntry { .. }));
    }
}

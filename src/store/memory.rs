//! In-memory ledger store
//!
//! Same contract as the PostgreSQL store, kept in process. Writes made in a
//! unit of work stay private to it until commit; reads see committed data
//! plus the unit's own writes (read committed). The ledger lock is a real
//! async mutex, so lock holders serialize exactly as they do in the database.
//!
//! Intended for tests and local runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::domain::{Account, Entry, LedgerError, LedgerResult, Transaction, TransactionKind};

use super::rows::{fold_rows, TransactionEntryRow};
use super::{validate_entries, AccountStore, LedgerStore, UnitOfWork};

#[derive(Debug, Default, Clone)]
struct LedgerTables {
    accounts: Vec<Account>,
    /// Transaction rows only; their entries live in `entries`
    transactions: Vec<Transaction>,
    entries: Vec<Entry>,
}

impl LedgerTables {
    fn merged(&self, pending: &LedgerTables) -> LedgerTables {
        let mut view = self.clone();
        view.accounts.extend(pending.accounts.iter().cloned());
        view.transactions.extend(pending.transactions.iter().cloned());
        view.entries.extend(pending.entries.iter().cloned());
        view
    }

    fn with_balance(&self, account: &Account) -> Account {
        let mut account = account.clone();
        account.balance = self
            .entries
            .iter()
            .filter(|e| e.account_id == account.id)
            .map(Entry::net)
            .sum();
        account
    }

    fn username_of(&self, account_id: Uuid) -> Option<String> {
        self.accounts
            .iter()
            .find(|a| a.id == account_id)
            .map(|a| a.username.clone())
    }
}

fn lock_tables(tables: &Mutex<LedgerTables>) -> LedgerResult<MutexGuard<'_, LedgerTables>> {
    tables
        .lock()
        .map_err(|_| LedgerError::Storage("ledger tables lock poisoned".to_string()))
}

/// A unit of work over [`MemoryLedgerStore`]
pub struct MemoryUnitOfWork {
    committed: Arc<Mutex<LedgerTables>>,
    pending: LedgerTables,
    ledger_lock: Option<OwnedMutexGuard<()>>,
}

impl MemoryUnitOfWork {
    fn view(&self) -> LedgerResult<LedgerTables> {
        Ok(lock_tables(&self.committed)?.merged(&self.pending))
    }

    /// Whether this unit currently holds the ledger lock
    pub fn holds_ledger_lock(&self) -> bool {
        self.ledger_lock.is_some()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self) -> LedgerResult<()> {
        let mut committed = lock_tables(&self.committed)?;

        // Another unit may have committed the same account since this one
        // read its snapshot; nothing is applied when that happens
        for account in &self.pending.accounts {
            if committed
                .accounts
                .iter()
                .any(|a| a.username == account.username)
            {
                return Err(LedgerError::UsernameTaken(account.username.clone()));
            }
            if committed.accounts.iter().any(|a| a.id == account.id) {
                return Err(LedgerError::Storage(format!(
                    "duplicate account id {}",
                    account.id
                )));
            }
        }

        committed.accounts.extend(self.pending.accounts);
        committed.transactions.extend(self.pending.transactions);
        committed.entries.extend(self.pending.entries);
        // ledger lock guard drops with `self`
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        Ok(())
    }
}

/// Process-local ledger store
#[derive(Debug, Default, Clone)]
pub struct MemoryLedgerStore {
    committed: Arc<Mutex<LedgerTables>>,
    ledger_lock: Arc<tokio::sync::Mutex<()>>,
    units_opened: Arc<AtomicUsize>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units of work opened so far
    pub fn units_opened(&self) -> usize {
        self.units_opened.load(Ordering::SeqCst)
    }

    /// Committed transaction rows
    pub fn transaction_count(&self) -> LedgerResult<usize> {
        Ok(lock_tables(&self.committed)?.transactions.len())
    }

    /// Committed entry rows
    pub fn entry_count(&self) -> LedgerResult<usize> {
        Ok(lock_tables(&self.committed)?.entries.len())
    }
}

#[async_trait]
impl AccountStore for MemoryLedgerStore {
    type Unit = MemoryUnitOfWork;

    async fn list_accounts(&self, unit: &mut MemoryUnitOfWork) -> LedgerResult<Vec<Account>> {
        let view = unit.view()?;
        let mut accounts: Vec<Account> = view
            .accounts
            .iter()
            .map(|account| view.with_balance(account))
            .collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }

    async fn get_account_by_username(
        &self,
        unit: &mut MemoryUnitOfWork,
        username: &str,
    ) -> LedgerResult<Account> {
        let view = unit.view()?;
        view.accounts
            .iter()
            .find(|a| a.username == username)
            .map(|account| view.with_balance(account))
            .ok_or_else(|| LedgerError::AccountNotFound(username.to_string()))
    }

    async fn create_account(
        &self,
        unit: &mut MemoryUnitOfWork,
        account: &Account,
    ) -> LedgerResult<()> {
        let view = unit.view()?;
        if view.accounts.iter().any(|a| a.username == account.username) {
            return Err(LedgerError::UsernameTaken(account.username.clone()));
        }
        if view.accounts.iter().any(|a| a.id == account.id) {
            return Err(LedgerError::Storage(format!(
                "duplicate account id {}",
                account.id
            )));
        }

        let mut row = account.clone();
        row.balance = rust_decimal::Decimal::ZERO;
        unit.pending.accounts.push(row);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin_unit_of_work(&self) -> LedgerResult<MemoryUnitOfWork> {
        self.units_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryUnitOfWork {
            committed: Arc::clone(&self.committed),
            pending: LedgerTables::default(),
            ledger_lock: None,
        })
    }

    async fn lock_transactions(&self, unit: &mut MemoryUnitOfWork) -> LedgerResult<()> {
        if unit.ledger_lock.is_none() {
            let guard = Arc::clone(&self.ledger_lock).lock_owned().await;
            unit.ledger_lock = Some(guard);
            tracing::debug!("Ledger lock acquired");
        }
        Ok(())
    }

    async fn create_transaction(
        &self,
        unit: &mut MemoryUnitOfWork,
        transaction: &Transaction,
    ) -> LedgerResult<()> {
        let view = unit.view()?;
        if view.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(LedgerError::Storage(format!(
                "duplicate transaction id {}",
                transaction.id
            )));
        }

        let mut row = transaction.clone();
        row.entries.clear();
        unit.pending.transactions.push(row);
        Ok(())
    }

    async fn create_entries(
        &self,
        unit: &mut MemoryUnitOfWork,
        transaction_id: Uuid,
        entries: &[Entry],
    ) -> LedgerResult<()> {
        validate_entries(transaction_id, entries)?;

        let view = unit.view()?;
        if !view.transactions.iter().any(|t| t.id == transaction_id) {
            return Err(LedgerError::Storage(format!(
                "entries reference unknown transaction {}",
                transaction_id
            )));
        }
        let referenced = entries
            .iter()
            .flat_map(|e| std::iter::once(e.account_id).chain(e.target_account_id));
        for account_id in referenced {
            if !view.accounts.iter().any(|a| a.id == account_id) {
                return Err(LedgerError::Storage(format!(
                    "entries reference unknown account {}",
                    account_id
                )));
            }
        }

        unit.pending.entries.extend(entries.iter().cloned());
        Ok(())
    }

    async fn get_transactions_by_name(
        &self,
        unit: &mut MemoryUnitOfWork,
        kind: TransactionKind,
    ) -> LedgerResult<Vec<Transaction>> {
        let view = unit.view()?;

        // Same ordering as the SQL query: newest first, id as tie-breaker
        let mut headers: Vec<&Transaction> =
            view.transactions.iter().filter(|t| t.kind == kind).collect();
        headers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let mut rows = Vec::new();
        for header in headers {
            let mut entries: Vec<&Entry> = view
                .entries
                .iter()
                .filter(|e| e.transaction_id == header.id)
                .collect();
            entries.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(b.direction.as_str().cmp(a.direction.as_str()))
            });

            for entry in entries {
                let account_username = view.username_of(entry.account_id).ok_or_else(|| {
                    LedgerError::Storage(format!("entry {} has no owning account", entry.id))
                })?;
                rows.push(TransactionEntryRow {
                    transaction_id: header.id,
                    kind: header.kind,
                    transaction_created_at: header.created_at,
                    transaction_updated_at: header.updated_at,
                    entry_id: entry.id,
                    account_id: entry.account_id,
                    target_account_id: entry.target_account_id,
                    direction: entry.direction,
                    credit: entry.credit,
                    debit: entry.debit,
                    entry_created_at: entry.created_at,
                    entry_updated_at: entry.updated_at,
                    account_username,
                    target_username: entry.target_account_id.and_then(|id| view.username_of(id)),
                });
            }
        }

        Ok(fold_rows(rows))
    }
}

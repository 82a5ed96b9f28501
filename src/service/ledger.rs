//! Ledger Service
//!
//! Account creation, deposits and payments over derived balances.
//!
//! Mutating operations follow the same shape: validate caller input without
//! touching storage, open a unit of work, do the work inside it, then commit.
//! Any failure after the unit is opened rolls it back before the error is
//! returned, so no exit path leaves a unit of work open.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::{
    Account, Amount, ErrorKind, LedgerError, LedgerResult, Transaction, TransactionKind,
};
use crate::store::{LedgerStore, UnitOfWork};

use super::metrics::{Operation, OperationMetrics};

/// Currency given to new accounts unless configured otherwise
pub const DEFAULT_CURRENCY: &str = "USD";

/// The ledger's public operations, generic over the storage backend
#[derive(Debug, Clone)]
pub struct LedgerService<S> {
    store: S,
    default_currency: String,
    metrics: Arc<OperationMetrics>,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            default_currency: DEFAULT_CURRENCY.to_string(),
            metrics: Arc::new(OperationMetrics::new()),
        }
    }

    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Call counts and latencies of the public operations
    pub fn metrics(&self) -> &OperationMetrics {
        &self.metrics
    }

    /// Create an account with the default currency
    pub async fn create_account(&self, username: &str) -> LedgerResult<Account> {
        let started = Instant::now();
        let result = self.open_account(username).await;
        self.observe(Operation::CreateAccount, started, &result);
        result
    }

    /// All accounts with derived balances, ordered by username
    pub async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let started = Instant::now();
        let result = self.fetch_accounts().await;
        self.observe(Operation::ListAccounts, started, &result);
        result
    }

    /// All payment transactions with their entries, most recent first.
    ///
    /// Returns the raw transactions; see [`crate::domain::to_payments`] for
    /// the counterparty-labeled view.
    pub async fn list_payment_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let started = Instant::now();
        let result = self.fetch_payment_transactions().await;
        self.observe(Operation::ListPaymentTransactions, started, &result);
        result
    }

    /// Credit external money to an account
    pub async fn deposit(&self, username: &str, amount: Decimal) -> LedgerResult<Transaction> {
        let started = Instant::now();
        let result = self.credit(username, amount).await;
        self.observe(Operation::Deposit, started, &result);
        result
    }

    /// Move `amount` from one account to another
    pub async fn send_payment(
        &self,
        from_username: &str,
        to_username: &str,
        amount: Decimal,
    ) -> LedgerResult<Transaction> {
        let started = Instant::now();
        let result = self.transfer(from_username, to_username, amount).await;
        self.observe(Operation::SendPayment, started, &result);
        result
    }

    fn observe<T>(&self, operation: Operation, started: Instant, result: &LedgerResult<T>) {
        let elapsed = started.elapsed();
        self.metrics.record(operation, elapsed, result.is_ok());
        tracing::debug!(
            operation = operation.as_str(),
            success = result.is_ok(),
            duration_ms = %elapsed.as_millis(),
            "Ledger operation finished"
        );
    }

    async fn open_account(&self, username: &str) -> LedgerResult<Account> {
        let username = username.trim();
        if username.is_empty() {
            return Err(LedgerError::InvalidUsername);
        }

        let account = Account::new(username, self.default_currency.as_str());

        let mut unit = self.store.begin_unit_of_work().await?;
        let created = self.store.create_account(&mut unit, &account).await;
        if let Err(e) = created {
            return Self::rollback(unit, e).await;
        }
        unit.commit().await?;

        tracing::info!(
            account_id = %account.id,
            username = %account.username,
            currency = %account.currency,
            "Account created"
        );

        Ok(account)
    }

    async fn fetch_accounts(&self) -> LedgerResult<Vec<Account>> {
        let mut unit = self.store.begin_unit_of_work().await?;
        let result = self.store.list_accounts(&mut unit).await;
        Self::release(unit).await;
        result
    }

    async fn fetch_payment_transactions(&self) -> LedgerResult<Vec<Transaction>> {
        let mut unit = self.store.begin_unit_of_work().await?;
        let result = self
            .store
            .get_transactions_by_name(&mut unit, TransactionKind::Payment)
            .await;
        Self::release(unit).await;
        result
    }

    async fn credit(&self, username: &str, amount: Decimal) -> LedgerResult<Transaction> {
        let amount = Amount::new(amount)?;
        let username = username.trim();

        let mut unit = self.store.begin_unit_of_work().await?;
        let recorded = self.record_deposit(&mut unit, username, amount).await;
        let transaction = match recorded {
            Ok(transaction) => transaction,
            Err(e) => return Self::rollback(unit, e).await,
        };
        unit.commit().await?;

        tracing::info!(
            transaction_id = %transaction.id,
            username = %username,
            amount = %amount,
            "Deposit recorded"
        );

        Ok(transaction)
    }

    async fn transfer(
        &self,
        from_username: &str,
        to_username: &str,
        amount: Decimal,
    ) -> LedgerResult<Transaction> {
        let amount = Amount::new(amount)?;

        let from_username = from_username.trim();
        let to_username = to_username.trim();
        if from_username == to_username {
            return Err(LedgerError::IdenticalParties);
        }

        let mut unit = self.store.begin_unit_of_work().await?;
        let recorded = self
            .record_payment(&mut unit, from_username, to_username, amount)
            .await;
        let transaction = match recorded {
            Ok(transaction) => transaction,
            Err(e) => return Self::rollback(unit, e).await,
        };
        unit.commit().await?;

        tracing::info!(
            transaction_id = %transaction.id,
            from = %from_username,
            to = %to_username,
            amount = %amount,
            "Payment recorded"
        );

        Ok(transaction)
    }

    async fn record_deposit(
        &self,
        unit: &mut S::Unit,
        username: &str,
        amount: Amount,
    ) -> LedgerResult<Transaction> {
        let account = self.store.get_account_by_username(unit, username).await?;

        self.store.lock_transactions(unit).await?;

        let transaction = Transaction::deposit(&account, amount);
        self.write(unit, &transaction).await?;

        Ok(transaction)
    }

    async fn record_payment(
        &self,
        unit: &mut S::Unit,
        from_username: &str,
        to_username: &str,
        amount: Amount,
    ) -> LedgerResult<Transaction> {
        let sender = self.store.get_account_by_username(unit, from_username).await?;
        let receiver = self.store.get_account_by_username(unit, to_username).await?;

        // Fail fast without taking the lock
        if !amount.is_covered_by(sender.balance) {
            return Err(LedgerError::insufficient_balance(
                amount.value(),
                sender.balance,
            ));
        }

        self.store.lock_transactions(unit).await?;

        // The balance read above may be stale by the time the lock is granted
        let sender = self.store.get_account_by_username(unit, from_username).await?;
        if !amount.is_covered_by(sender.balance) {
            tracing::debug!(
                username = %sender.username,
                balance = %sender.balance,
                "Balance changed while waiting for the ledger lock"
            );
            return Err(LedgerError::insufficient_balance(
                amount.value(),
                sender.balance,
            ));
        }

        let transaction = Transaction::payment(&sender, &receiver, amount);
        self.write(unit, &transaction).await?;

        Ok(transaction)
    }

    async fn write(&self, unit: &mut S::Unit, transaction: &Transaction) -> LedgerResult<()> {
        self.store.create_transaction(unit, transaction).await?;
        self.store
            .create_entries(unit, transaction.id, &transaction.entries)
            .await
    }

    /// Roll back and hand back the error that caused it
    async fn rollback<T>(unit: S::Unit, error: LedgerError) -> LedgerResult<T> {
        if let Err(rollback_error) = unit.rollback().await {
            tracing::warn!(
                error = %error,
                rollback_error = %rollback_error,
                "Rollback failed"
            );
        }
        if error.kind() == ErrorKind::Infrastructure {
            tracing::error!(error = %error, "Ledger operation failed");
        }
        Err(error)
    }

    /// End a read-only unit of work
    async fn release(unit: S::Unit) {
        if let Err(e) = unit.rollback().await {
            tracing::warn!(error = %e, "Failed to release read-only unit of work");
        }
    }
}

//! PostgreSQL ledger store
//!
//! Every unit of work is a database transaction whose `search_path` is
//! pinned to the ledger schema, so all statements below use bare table names.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Account, Entry, LedgerError, LedgerResult, Transaction, TransactionKind};

use super::rows::{fold_rows, TransactionEntryRow};
use super::{validate_entries, AccountStore, LedgerStore, UnitOfWork};

/// Schema the ledger tables live in unless configured otherwise
pub const DEFAULT_SCHEMA: &str = "wallet";

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const SQL_SELECT_ACCOUNTS: &str = r#"
    SELECT
        a.id,
        a.username,
        a.currency,
        a.created_at,
        a.updated_at,
        COALESCE(SUM(te.credit + te.debit), 0) AS balance
    FROM accounts a
    LEFT JOIN transaction_entries te ON te.account_id = a.id
"#;

// Rows of one transaction must stay contiguous for fold_rows: t.id breaks
// ties between transactions created at the same instant.
const SQL_GET_TRANSACTIONS_BY_NAME: &str = r#"
    SELECT
        t.id AS transaction_id,
        t.name AS transaction_name,
        t.created_at AS transaction_created_at,
        t.updated_at AS transaction_updated_at,
        te.id AS entry_id,
        te.account_id,
        te.target_account_id,
        te.name AS entry_name,
        te.credit,
        te.debit,
        te.created_at AS entry_created_at,
        te.updated_at AS entry_updated_at,
        a1.username AS account_username,
        a2.username AS target_username
    FROM transactions t
    INNER JOIN transaction_entries te ON te.transaction_id = t.id
    INNER JOIN accounts a1 ON a1.id = te.account_id
    LEFT OUTER JOIN accounts a2 ON a2.id = te.target_account_id
    WHERE t.name = $1
    ORDER BY t.created_at DESC, t.id, te.created_at, te.name DESC
"#;

/// A PostgreSQL transaction scoped to the ledger schema
pub struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Ledger store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    schema: String,
    lock_timeout: Option<Duration>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema: DEFAULT_SCHEMA.to_string(),
            lock_timeout: None,
        }
    }

    /// Bind units of work to another schema (must already hold the ledger tables)
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Bound how long `lock_transactions` may wait; expiry surfaces as a
    /// database error
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn row_to_account(row: &PgRow) -> LedgerResult<Account> {
        Ok(Account {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            currency: row.try_get("currency")?,
            balance: row.try_get("balance")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_entry_row(row: &PgRow) -> LedgerResult<TransactionEntryRow> {
        let kind: String = row.try_get("transaction_name")?;
        let direction: String = row.try_get("entry_name")?;

        Ok(TransactionEntryRow {
            transaction_id: row.try_get("transaction_id")?,
            kind: kind.parse()?,
            transaction_created_at: row.try_get("transaction_created_at")?,
            transaction_updated_at: row.try_get("transaction_updated_at")?,
            entry_id: row.try_get("entry_id")?,
            account_id: row.try_get("account_id")?,
            target_account_id: row.try_get("target_account_id")?,
            direction: direction.parse()?,
            credit: row.try_get("credit")?,
            debit: row.try_get("debit")?,
            entry_created_at: row.try_get("entry_created_at")?,
            entry_updated_at: row.try_get("entry_updated_at")?,
            account_username: row.try_get("account_username")?,
            target_username: row.try_get("target_username")?,
        })
    }
}

#[async_trait]
impl AccountStore for PgLedgerStore {
    type Unit = PgUnitOfWork;

    async fn list_accounts(&self, unit: &mut PgUnitOfWork) -> LedgerResult<Vec<Account>> {
        let sql = format!("{} GROUP BY a.id ORDER BY a.username ASC", SQL_SELECT_ACCOUNTS);
        let rows = sqlx::query(&sql).fetch_all(&mut *unit.tx).await?;

        rows.iter().map(Self::row_to_account).collect()
    }

    async fn get_account_by_username(
        &self,
        unit: &mut PgUnitOfWork,
        username: &str,
    ) -> LedgerResult<Account> {
        let sql = format!("{} WHERE a.username = $1 GROUP BY a.id", SQL_SELECT_ACCOUNTS);
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&mut *unit.tx)
            .await?;

        match row {
            Some(row) => Self::row_to_account(&row),
            None => Err(LedgerError::AccountNotFound(username.to_string())),
        }
    }

    async fn create_account(&self, unit: &mut PgUnitOfWork, account: &Account) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, username, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.id)
        .bind(&account.username)
        .bind(&account.currency)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *unit.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                LedgerError::UsernameTaken(account.username.clone())
            }
            e => LedgerError::Database(e),
        })?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin_unit_of_work(&self) -> LedgerResult<PgUnitOfWork> {
        let mut tx = self.pool.begin().await?;

        // Transaction-local settings; dropping `tx` on error rolls them back
        sqlx::query("SELECT set_config('search_path', $1, true)")
            .bind(&self.schema)
            .execute(&mut *tx)
            .await?;

        if let Some(timeout) = self.lock_timeout {
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(format!("{}ms", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }

        Ok(PgUnitOfWork { tx })
    }

    async fn lock_transactions(&self, unit: &mut PgUnitOfWork) -> LedgerResult<()> {
        // Self-conflicting and conflicts with INSERT, but not with plain reads.
        // Unlike SELECT ... FOR UPDATE it also holds on an empty ledger.
        sqlx::query("LOCK TABLE transactions IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *unit.tx)
            .await?;

        tracing::debug!(schema = %self.schema, "Ledger lock acquired");
        Ok(())
    }

    async fn create_transaction(
        &self,
        unit: &mut PgUnitOfWork,
        transaction: &Transaction,
    ) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.kind.as_str())
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *unit.tx)
        .await?;

        Ok(())
    }

    async fn create_entries(
        &self,
        unit: &mut PgUnitOfWork,
        transaction_id: Uuid,
        entries: &[Entry],
    ) -> LedgerResult<()> {
        validate_entries(transaction_id, entries)?;

        if entries.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO transaction_entries \
             (id, transaction_id, account_id, target_account_id, name, credit, debit, created_at, updated_at) ",
        );
        builder.push_values(entries, |mut values, entry| {
            values
                .push_bind(entry.id)
                .push_bind(entry.transaction_id)
                .push_bind(entry.account_id)
                .push_bind(entry.target_account_id)
                .push_bind(entry.direction.as_str())
                .push_bind(entry.credit)
                .push_bind(entry.debit)
                .push_bind(entry.created_at)
                .push_bind(entry.updated_at);
        });

        builder.build().execute(&mut *unit.tx).await?;

        Ok(())
    }

    async fn get_transactions_by_name(
        &self,
        unit: &mut PgUnitOfWork,
        kind: TransactionKind,
    ) -> LedgerResult<Vec<Transaction>> {
        let rows = sqlx::query(SQL_GET_TRANSACTIONS_BY_NAME)
            .bind(kind.as_str())
            .fetch_all(&mut *unit.tx)
            .await?;

        let rows = rows
            .iter()
            .map(Self::row_to_entry_row)
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok(fold_rows(rows))
    }
}

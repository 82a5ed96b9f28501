//! Database module
//!
//! Pool construction and ledger schema utilities.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

use crate::config::{is_identifier, Config};

/// DDL for the ledger tables, applied inside the target schema
pub const LEDGER_SCHEMA_SQL: &str = include_str!("../migrations/0001_ledger.sql");

const REQUIRED_TABLES: [&str; 3] = ["accounts", "transactions", "transaction_entries"];

/// Create the connection pool
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

fn checked_schema_name(schema: &str) -> Result<&str, sqlx::Error> {
    if is_identifier(schema) {
        Ok(schema)
    } else {
        Err(sqlx::Error::Configuration(
            format!("invalid schema name: {:?}", schema).into(),
        ))
    }
}

/// Create `schema` if needed and the ledger tables inside it
pub async fn apply_schema(pool: &PgPool, schema: &str) -> Result<(), sqlx::Error> {
    let schema = checked_schema_name(schema)?;
    let mut tx = pool.begin().await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(&mut *tx)
        .await?;
    sqlx::query("SELECT set_config('search_path', $1, true)")
        .bind(schema)
        .execute(&mut *tx)
        .await?;
    // Multi-statement script, sent unprepared
    (&mut *tx).execute(LEDGER_SCHEMA_SQL).await?;

    tx.commit().await?;
    tracing::info!(schema = %schema, "Ledger schema applied");
    Ok(())
}

/// Drop `schema` and everything in it
pub async fn drop_schema(pool: &PgPool, schema: &str) -> Result<(), sqlx::Error> {
    let schema = checked_schema_name(schema)?;
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
        .execute(pool)
        .await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool, schema: &str) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}.{}' does not exist", schema, table);
            return Ok(false);
        }
    }

    Ok(true)
}

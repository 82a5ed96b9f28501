//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;
use wallet_ledger::store::{MemoryLedgerStore, PgLedgerStore};
use wallet_ledger::{api, db, LedgerService};

/// Router over a fresh in-memory ledger
pub fn memory_app() -> axum::Router {
    api::build_router(Arc::new(LedgerService::new(MemoryLedgerStore::new())))
}

/// A ledger in its own throwaway schema. Call `teardown` at the end of the
/// test; a panicking test leaves its schema behind.
pub struct TestLedger {
    pub pool: PgPool,
    pub schema: String,
    pub service: Arc<LedgerService<PgLedgerStore>>,
}

impl TestLedger {
    pub async fn teardown(self) {
        db::drop_schema(&self.pool, &self.schema)
            .await
            .expect("Failed to drop test schema");
        self.pool.close().await;
    }
}

/// Setup test database with a fresh schema, or `None` without `DATABASE_URL`
pub async fn setup_test_db() -> Option<TestLedger> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let schema = format!("ledger_test_{}", Uuid::new_v4().simple());
    db::apply_schema(&pool, &schema)
        .await
        .expect("Failed to apply ledger schema");

    let store = PgLedgerStore::new(pool.clone()).with_schema(schema.clone());
    Some(TestLedger {
        pool,
        schema,
        service: Arc::new(LedgerService::new(store)),
    })
}

//! PostgreSQL ledger integration tests
//!
//! Need a reachable database in `DATABASE_URL`; each test works in its own
//! schema. Skipped when the variable is unset.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use wallet_ledger::domain::{Account, Amount, Transaction};
use wallet_ledger::store::{AccountStore, LedgerStore, PgLedgerStore, UnitOfWork};
use wallet_ledger::{db, EntryDirection, LedgerError};

mod common;

fn balance_of(accounts: &[Account], username: &str) -> Decimal {
    accounts
        .iter()
        .find(|a| a.username == username)
        .map(|a| a.balance)
        .unwrap()
}

#[tokio::test]
async fn test_schema_is_applied() {
    let Some(ledger) = common::setup_test_db().await else {
        return;
    };

    assert!(db::check_schema(&ledger.pool, &ledger.schema).await.unwrap());
    assert!(!db::check_schema(&ledger.pool, "no_such_schema").await.unwrap());
    // Applying twice is harmless
    db::apply_schema(&ledger.pool, &ledger.schema).await.unwrap();

    ledger.teardown().await;
}

#[tokio::test]
async fn test_deposit_and_payment_flow() {
    let Some(ledger) = common::setup_test_db().await else {
        return;
    };
    let service = &ledger.service;

    for name in ["bob", "alice"] {
        service.create_account(name).await.unwrap();
        service.deposit(name, dec!(200.00)).await.unwrap();
    }

    let accounts = service.list_accounts().await.unwrap();
    let names: Vec<&str> = accounts.iter().map(|a| a.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(balance_of(&accounts, "alice"), dec!(200));

    let payment = service
        .send_payment("bob", "alice", dec!(100.00))
        .await
        .unwrap();

    let accounts = service.list_accounts().await.unwrap();
    assert_eq!(balance_of(&accounts, "alice"), dec!(300));
    assert_eq!(balance_of(&accounts, "bob"), dec!(100));

    let payments = service.list_payment_transactions().await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].id, payment.id);
    assert!(payments[0].is_balanced());

    let entries = &payments[0].entries;
    assert_eq!(entries.len(), 2);
    let outgoing = entries
        .iter()
        .find(|e| e.direction == EntryDirection::Outgoing)
        .unwrap();
    assert_eq!(outgoing.account_username, "bob");
    assert_eq!(outgoing.target_username.as_deref(), Some("alice"));
    assert_eq!(outgoing.debit, dec!(-100));

    ledger.teardown().await;
}

#[tokio::test]
async fn test_failures_write_nothing() {
    let Some(ledger) = common::setup_test_db().await else {
        return;
    };
    let service = &ledger.service;
    service.create_account("alice").await.unwrap();
    service.create_account("bob").await.unwrap();
    service.deposit("bob", dec!(200)).await.unwrap();

    let err = service
        .send_payment("bob", "alice", dec!(201.00))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

    let err = service
        .send_payment("bob", "alice", dec!(-5))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(_)));

    let err = service.create_account("alice").await.unwrap_err();
    assert!(matches!(err, LedgerError::UsernameTaken(_)));

    let err = service.deposit("ghost", dec!(1)).await.unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(_)));

    assert!(service.list_payment_transactions().await.unwrap().is_empty());
    let entries: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {}.transaction_entries",
        ledger.schema
    ))
    .fetch_one(&ledger.pool)
    .await
    .unwrap();
    assert_eq!(entries, 1);

    ledger.teardown().await;
}

#[tokio::test]
async fn test_entry_mismatch_inserts_nothing() {
    let Some(ledger) = common::setup_test_db().await else {
        return;
    };
    let store = ledger.service.store();
    let alice = ledger.service.create_account("alice").await.unwrap();
    let bob = ledger.service.create_account("bob").await.unwrap();

    let amount = Amount::new(dec!(10)).unwrap();
    let target = Transaction::payment(&bob, &alice, amount);
    let stray = Transaction::deposit(&alice, amount);

    let mut unit = store.begin_unit_of_work().await.unwrap();
    store.create_transaction(&mut unit, &target).await.unwrap();
    let mut entries = target.entries.clone();
    entries.extend(stray.entries.iter().cloned());

    let err = store
        .create_entries(&mut unit, target.id, &entries)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::EntryMismatch { .. }));

    // The unit is still usable: nothing was sent for the rejected batch
    let transactions = store
        .get_transactions_by_name(&mut unit, wallet_ledger::TransactionKind::Payment)
        .await
        .unwrap();
    assert!(transactions.is_empty());
    unit.rollback().await.unwrap();

    ledger.teardown().await;
}

#[tokio::test]
async fn test_concurrent_payments_cannot_overdraw() {
    let Some(ledger) = common::setup_test_db().await else {
        return;
    };
    let service = Arc::clone(&ledger.service);
    for name in ["payer", "payee"] {
        service.create_account(name).await.unwrap();
    }
    service.deposit("payer", dec!(100)).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.send_payment("payer", "payee", dec!(7)).await })
        })
        .collect();

    let mut succeeded = 0i64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientBalance { .. }) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(succeeded, 14);

    let accounts = service.list_accounts().await.unwrap();
    assert_eq!(balance_of(&accounts, "payer"), dec!(2));
    assert_eq!(balance_of(&accounts, "payee"), dec!(98));

    let payments = service.list_payment_transactions().await.unwrap();
    assert_eq!(payments.len(), 14);
    assert!(payments.iter().all(|t| t.is_balanced()));

    drop(service);
    ledger.teardown().await;
}

#[tokio::test]
async fn test_lock_wait_times_out() {
    let Some(ledger) = common::setup_test_db().await else {
        return;
    };
    let holder_store = PgLedgerStore::new(ledger.pool.clone()).with_schema(ledger.schema.clone());
    let waiter_store = holder_store
        .clone()
        .with_lock_timeout(Duration::from_millis(100));

    let mut holder = holder_store.begin_unit_of_work().await.unwrap();
    holder_store.lock_transactions(&mut holder).await.unwrap();

    let mut waiter = waiter_store.begin_unit_of_work().await.unwrap();
    let err = waiter_store
        .lock_transactions(&mut waiter)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Database(_)));
    assert!(err.is_retryable());

    // Readers are not blocked by the lock
    let mut reader = waiter_store.begin_unit_of_work().await.unwrap();
    let accounts = waiter_store.list_accounts(&mut reader).await.unwrap();
    assert!(accounts.is_empty());
    reader.rollback().await.unwrap();

    waiter.rollback().await.unwrap();
    holder.rollback().await.unwrap();
    ledger.teardown().await;
}

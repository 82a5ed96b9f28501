//! Ledger contention check
//!
//! Fires concurrent payments from one funded account and verifies that the
//! ledger lock keeps the payer from being overdrawn.
//!
//! Run with: cargo run --bin ledger_stress --release -- --payments 200

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;
use wallet_ledger::store::PgLedgerStore;
use wallet_ledger::{db, LedgerError, LedgerService};

const FUNDING: i64 = 1_000;
const PAYMENT: i64 = 7;

fn arg<T: std::str::FromStr>(args: &[String], name: &str) -> Option<T> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let payment_count: usize = arg(&args, "--payments").unwrap_or(200);
    let connections: u32 = arg(&args, "--connections").unwrap_or(10);
    let schema = format!("ledger_stress_{}", Uuid::new_v4().simple());

    let database_url = std::env::var("DATABASE_URL")?;

    println!("Ledger stress - {} concurrent payments", payment_count);
    println!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(connections)
        .connect(&database_url)
        .await?;
    db::apply_schema(&pool, &schema).await?;

    let service = Arc::new(LedgerService::new(
        PgLedgerStore::new(pool.clone()).with_schema(schema.clone()),
    ));
    service.create_account("payer").await?;
    service.create_account("payee").await?;
    service.deposit("payer", Decimal::from(FUNDING)).await?;

    let start = Instant::now();
    let handles: Vec<_> = (0..payment_count)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .send_payment("payer", "payee", Decimal::from(PAYMENT))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0i64;
    let mut refused = 0u64;
    let mut failed = 0u64;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientBalance { .. }) => refused += 1,
            Err(e) => {
                eprintln!("payment failed: {}", e);
                failed += 1;
            }
        }
    }
    let elapsed = start.elapsed();

    let accounts = service.list_accounts().await?;
    let balance = |name: &str| {
        accounts
            .iter()
            .find(|a| a.username == name)
            .map(|a| a.balance)
            .unwrap_or_default()
    };
    let payer = balance("payer");
    let payee = balance("payee");
    let payments = service.list_payment_transactions().await?;
    let unbalanced = payments.iter().filter(|t| !t.is_balanced()).count();

    println!("\n=== Ledger Stress Results ===");
    println!("Payments attempted: {}", payment_count);
    println!("Succeeded: {}", succeeded);
    println!("Insufficient balance: {}", refused);
    println!("Other failures: {}", failed);
    println!("Payer balance: {}", payer);
    println!("Payee balance: {}", payee);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!(
        "Rate: {:.0} payments/sec",
        payment_count as f64 / elapsed.as_secs_f64()
    );

    db::drop_schema(&pool, &schema).await?;
    pool.close().await;

    anyhow::ensure!(payer >= Decimal::ZERO, "payer overdrawn: {}", payer);
    anyhow::ensure!(
        payer + payee == Decimal::from(FUNDING),
        "money not conserved: payer {} + payee {}",
        payer,
        payee
    );
    anyhow::ensure!(
        payee == Decimal::from(succeeded * PAYMENT),
        "payee balance {} does not match {} successful payments",
        payee,
        succeeded
    );
    anyhow::ensure!(unbalanced == 0, "{} payment transactions do not net to zero", unbalanced);
    anyhow::ensure!(
        payments.len() as i64 == succeeded,
        "{} payment transactions stored, {} reported",
        payments.len(),
        succeeded
    );

    println!("All ledger invariants hold");
    Ok(())
}

//! Wallet ledger - HTTP API over a double-entry ledger
//!
//! Balances are derived from ledger entries; payments and deposits are
//! serialized by a single ledger-wide lock.

use std::net::SocketAddr;
use std::sync::Arc;

use wallet_ledger::config::LogFormat;
use wallet_ledger::store::PgLedgerStore;
use wallet_ledger::{api, db, telemetry, Config, LedgerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Tracing comes up before a config error can be reported through it
    let config = Config::from_env();
    telemetry::init_tracing(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or(LogFormat::Pretty),
    );
    let config = config?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting wallet ledger server");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    // Verify database schema
    if !db::check_schema(&pool, &config.database_schema).await? {
        tracing::error!(
            schema = %config.database_schema,
            "Database schema is not complete. Please apply migrations/0001_ledger.sql."
        );
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let mut store = PgLedgerStore::new(pool.clone()).with_schema(config.database_schema.clone());
    if let Some(timeout) = config.ledger_lock_timeout {
        store = store.with_lock_timeout(timeout);
    }
    let service = LedgerService::new(store).with_default_currency(config.default_currency.clone());

    let app = api::build_router(Arc::new(service));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

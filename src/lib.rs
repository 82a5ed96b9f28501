//! Wallet ledger library
//!
//! Double-entry wallet ledger with balances derived from entries. Re-exports
//! modules for the server binary, integration tests and external use.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use domain::{Account, Amount, AmountError, ErrorKind, LedgerError, LedgerResult};
pub use domain::{Entry, EntryDirection, Payment, Transaction, TransactionKind};
pub use error::{AppError, AppResult};
pub use service::LedgerService;

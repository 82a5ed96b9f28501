//! Ledger service
//!
//! Orchestrates the account and ledger stores into the five operations the
//! transport layer exposes. Every operation runs in exactly one unit of work
//! and is counted and timed in [`metrics`].

mod ledger;
pub mod metrics;


pub use ledger::{LedgerService, DEFAULT_CURRENCY};
pub use metrics::{Operation, OperationMetrics, OperationSnapshot};

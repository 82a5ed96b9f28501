//! Domain module
//!
//! Core ledger types and business rules.

pub mod amount;
pub mod error;
pub mod model;
pub mod payment;

pub use amount::{Amount, AmountError};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use model::{Account, Entry, EntryDirection, Transaction, TransactionKind};
pub use payment::{to_payments, Payment, PaymentEntry};

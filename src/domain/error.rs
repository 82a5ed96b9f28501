//! Ledger Error Types
//!
//! Typed outcomes of every ledger operation, distinguishable by kind so the
//! transport layer can map them to distinct external responses.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::AmountError;

/// Result type used by the stores and the ledger service
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Coarse classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input is unusable; never partially mutates state
    Validation,
    /// Rejected against current stored state, after which the unit of work is rolled back
    Consistency,
    /// A referenced account does not exist
    NotFound,
    /// A uniqueness constraint refused the write
    Conflict,
    /// Opening, committing, rolling back or talking to storage failed
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Zero, negative, over-precise or unparsable amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Username is empty after trimming
    #[error("Invalid username: must not be blank")]
    InvalidUsername,

    /// Sender and receiver resolve to the same username
    #[error("Payment sender and receiver are identical")]
    IdenticalParties,

    /// Sender's derived balance does not cover the payment
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// An entry handed to `create_entries` belongs to another transaction
    #[error("Entry {entry_id} belongs to transaction {found}, expected {expected}")]
    EntryMismatch {
        entry_id: Uuid,
        expected: Uuid,
        found: Uuid,
    },

    /// An entry's direction disagrees with the sign of its credit/debit
    #[error("Entry {entry_id} has amounts that do not match its direction")]
    MalformedEntry { entry_id: Uuid },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage returned something the ledger cannot interpret
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Create an insufficient balance error
    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_) | Self::InvalidUsername | Self::IdenticalParties => {
                ErrorKind::Validation
            }
            Self::InsufficientBalance { .. }
            | Self::EntryMismatch { .. }
            | Self::MalformedEntry { .. } => ErrorKind::Consistency,
            Self::AccountNotFound(_) => ErrorKind::NotFound,
            Self::UsernameTaken(_) => ErrorKind::Conflict,
            Self::Database(_) | Self::Storage(_) => ErrorKind::Infrastructure,
        }
    }

    /// Check if this is a client error (the caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict
        ) || matches!(self, Self::InsufficientBalance { .. })
    }

    /// Only infrastructure failures may succeed on an identical retry; the
    /// core itself never retries.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

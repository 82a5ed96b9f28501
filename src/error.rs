//! Error handling module
//!
//! HTTP-facing error type and response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{ErrorKind, LedgerError};

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Ledger outcomes, mapped by kind
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status this error is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Ledger(e) => ledger_status(e),
            AppError::Internal(_) | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn ledger_status(error: &LedgerError) -> StatusCode {
    match error {
        // Entries are built by the service itself; a bad one is a server bug
        LedgerError::EntryMismatch { .. } | LedgerError::MalformedEntry { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        e => match e.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Consistency => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn ledger_code(error: &LedgerError) -> &'static str {
    match error {
        LedgerError::InvalidAmount(_) => "invalid_amount",
        LedgerError::InvalidUsername => "invalid_username",
        LedgerError::IdenticalParties => "identical_parties",
        LedgerError::InsufficientBalance { .. } => "insufficient_balance",
        LedgerError::EntryMismatch { .. } => "entry_mismatch",
        LedgerError::MalformedEntry { .. } => "malformed_entry",
        LedgerError::AccountNotFound(_) => "account_not_found",
        LedgerError::UsernameTaken(_) => "username_taken",
        LedgerError::Database(_) => "database_error",
        LedgerError::Storage(_) => "storage_error",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_code, details) = match &self {
            AppError::InvalidRequest(msg) => ("invalid_request", Some(msg.clone())),

            AppError::Ledger(e) if status.is_server_error() => {
                tracing::error!(error = ?e, "Ledger error");
                (ledger_code(e), None)
            }
            AppError::Ledger(e) => match e {
                LedgerError::InvalidAmount(amount_err) => {
                    ("invalid_amount", Some(amount_err.to_string()))
                }
                LedgerError::AccountNotFound(username) | LedgerError::UsernameTaken(username) => {
                    (ledger_code(e), Some(username.clone()))
                }
                _ => (ledger_code(e), None),
            },

            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                ("config_error", None)
            }
        };

        // Server-side failures do not leak storage details to the caller
        let error = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

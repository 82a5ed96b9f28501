//! API Routes
//!
//! HTTP endpoint definitions.

use std::str::FromStr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{to_payments, Account, Payment, Transaction, TransactionKind};
use crate::error::AppError;
use crate::service::LedgerService;
use crate::store::LedgerStore;

/// Shared state handed to every handler
pub type AppState<S> = Arc<LedgerService<S>>;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    /// The username; accounts are addressed by it externally
    pub id: String,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub balance: String,
    pub currency: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.username,
            balance: account.balance.normalize().to_string(),
            currency: account.currency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountResponse>,
}

#[derive(Debug, Serialize)]
pub struct PaymentsResponse {
    pub payments: Vec<Payment>,
}

#[derive(Debug, Deserialize)]
pub struct SendPaymentRequest {
    pub account: String,
    pub to_account: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub account: String,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionCreatedResponse {
    pub id: Uuid,
    pub name: TransactionKind,
}

impl From<&Transaction> for TransactionCreatedResponse {
    fn from(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id,
            name: transaction.kind,
        }
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| AppError::InvalidRequest(format!("Invalid amount '{}': {}", raw, e)))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router<S>() -> Router<AppState<S>>
where
    S: LedgerStore + 'static,
{
    Router::new()
        .route("/accounts", get(list_accounts::<S>).post(create_account::<S>))
        .route(
            "/payments",
            get(list_payments::<S>).post(send_payment::<S>),
        )
        .route("/deposits", axum::routing::post(deposit::<S>))
}

// =========================================================================
// Handlers
// =========================================================================

async fn list_accounts<S: LedgerStore>(
    State(service): State<AppState<S>>,
) -> Result<Json<AccountsResponse>, AppError> {
    let accounts = service.list_accounts().await?;

    Ok(Json(AccountsResponse {
        accounts: accounts.into_iter().map(AccountResponse::from).collect(),
    }))
}

async fn create_account<S: LedgerStore>(
    State(service): State<AppState<S>>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResponse>), AppError> {
    let account = service.create_account(&request.username).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            id: account.username,
            currency: account.currency,
        }),
    ))
}

async fn list_payments<S: LedgerStore>(
    State(service): State<AppState<S>>,
) -> Result<Json<PaymentsResponse>, AppError> {
    let transactions = service.list_payment_transactions().await?;

    Ok(Json(PaymentsResponse {
        payments: to_payments(&transactions),
    }))
}

async fn send_payment<S: LedgerStore>(
    State(service): State<AppState<S>>,
    Json(request): Json<SendPaymentRequest>,
) -> Result<(StatusCode, Json<TransactionCreatedResponse>), AppError> {
    let amount = parse_amount(&request.amount)?;
    let transaction = service
        .send_payment(&request.account, &request.to_account, amount)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionCreatedResponse::from(&transaction)),
    ))
}

async fn deposit<S: LedgerStore>(
    State(service): State<AppState<S>>,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<TransactionCreatedResponse>), AppError> {
    let amount = parse_amount(&request.amount)?;
    let transaction = service.deposit(&request.account, amount).await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionCreatedResponse::from(&transaction)),
    ))
}

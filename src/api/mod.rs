//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::http::HeaderName;
use axum::{extract::State, middleware as axum_middleware, routing::get, Json, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::service::OperationSnapshot;
use crate::store::LedgerStore;

pub use routes::{create_router, AppState};

/// Base path of the ledger endpoints
pub const API_PREFIX: &str = "/transaction/v1";

/// Build the application router
pub fn build_router<S>(state: AppState<S>) -> Router
where
    S: LedgerStore + 'static,
{
    let request_id = HeaderName::from_static(middleware::REQUEST_ID_HEADER);

    // Layers run bottom-up: request id is set before logging sees the request
    let api_routes =
        create_router::<S>().layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::<S>))
        .nest(API_PREFIX, api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[derive(Debug, serde::Serialize)]
pub struct MetricsResponse {
    pub operations: Vec<OperationSnapshot>,
}

/// Per-operation call counts and latency histograms
async fn metrics<S: LedgerStore>(State(service): State<AppState<S>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        operations: service.metrics().snapshot(),
    })
}

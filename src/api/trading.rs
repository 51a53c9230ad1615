//! Trading API
//!
//! - POST /api/trading/trades - Execute a trade
//! - GET /api/trading/positions - Holdings valued at current prices
//! - GET /api/trading/transactions - Transaction history, newest first
//! - GET /api/trading/transactions/:id - One transaction with its commission

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiResponse;
use crate::api::auth::Authenticated;
use crate::error::AppError;
use crate::services::TradeError;
use crate::types::{CommissionEarning, Holding, TradeRequest, TradeResponse, Transaction};
use crate::AppState;

/// Create trading router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trades", post(execute_trade))
        .route("/positions", get(list_positions))
        .route("/transactions", get(list_transactions))
        .route("/transactions/:id", get(get_transaction))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<CommissionEarning>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// POST /api/trading/trades
///
/// Malformed bodies (missing fields, non-numeric quantity) are reported
/// as `INVALID_AMOUNT` in the trade response shape.
async fn execute_trade(
    State(state): State<AppState>,
    auth: Authenticated,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<TradeResponse>, TradeError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!("Rejected trade body: {}", rejection.body_text());
        TradeError::InvalidAmount(rejection.body_text())
    })?;

    let result = state.engine.execute_trade(&auth.user.user_id, &request).await?;
    Ok(Json(TradeResponse::ok(result)))
}

/// GET /api/trading/positions
async fn list_positions(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Vec<Holding>>>, TradeError> {
    let holdings = state.accounts.holdings(&auth.user.user_id)?;
    Ok(Json(ApiResponse::new(holdings)))
}

/// GET /api/trading/transactions
async fn list_transactions(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, TradeError> {
    let transactions = state.accounts.transactions(&auth.user.user_id, query.limit)?;
    Ok(Json(ApiResponse::new(transactions)))
}

/// GET /api/trading/transactions/:id
///
/// Other users' transactions are reported as not found.
async fn get_transaction(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<TransactionDetail>>, Response> {
    let (transaction, commission) = state
        .accounts
        .transaction(&auth.user.user_id, &id)
        .map_err(IntoResponse::into_response)?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)).into_response())?;

    Ok(Json(ApiResponse::new(TransactionDetail {
        transaction,
        commission,
    })))
}

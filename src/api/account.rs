//! Account endpoints: balances, wallet deposits and withdrawals.

use super::auth::Authenticated;
use super::ApiResponse;
use crate::services::TradeError;
use crate::types::{Account, SettlementAsset, Transaction};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Deposit of a confirmed wallet payment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub asset: SettlementAsset,
    pub amount: Decimal,
    /// Wallet payment reference
    pub reference: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub asset: SettlementAsset,
    pub amount: Decimal,
}

/// GET /api/account
async fn get_account(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<Account>>, TradeError> {
    let account = state.accounts.get_or_create_account(&auth.user.user_id)?;
    Ok(Json(ApiResponse::new(account)))
}

/// POST /api/account/deposits
async fn deposit(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(request): Json<DepositRequest>,
) -> Result<Json<ApiResponse<Transaction>>, TradeError> {
    let tx = state
        .accounts
        .deposit(&auth.user.user_id, request.asset, request.amount, &request.reference)
        .await?;
    Ok(Json(ApiResponse::new(tx)))
}

/// POST /api/account/withdrawals
async fn withdraw(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(request): Json<WithdrawalRequest>,
) -> Result<Json<ApiResponse<Transaction>>, TradeError> {
    let tx = state
        .accounts
        .withdraw(&auth.user.user_id, request.asset, request.amount)
        .await?;
    Ok(Json(ApiResponse::new(tx)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_account))
        .route("/deposits", post(deposit))
        .route("/withdrawals", post(withdraw))
}

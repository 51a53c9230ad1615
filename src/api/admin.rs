//! Operator endpoints.
//!
//! - GET /api/admin/commissions - Commission totals per currency
//! - PUT /api/admin/instruments/:symbol - List or delist an instrument
//!
//! Guarded by the `X-Admin-Key` header, which must equal `ADMIN_API_KEY`.
//! When no key is configured every operator endpoint answers 403.

use super::ApiResponse;
use crate::error::{AppError, Result};
use crate::types::{CommissionTotal, MarketInstrument};
use crate::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    routing::{get, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Marker extractor for operator requests.
pub struct AdminKey;

#[async_trait]
impl FromRequestParts<AppState> for AdminKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_api_key.as_deref() else {
            return Err(AppError::Forbidden("operator endpoints are disabled".to_string()));
        };

        let provided = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        match provided {
            Some(key) if key == expected => Ok(AdminKey),
            _ => {
                warn!("Rejected operator request to {}", parts.uri.path());
                Err(AppError::Forbidden("invalid admin key".to_string()))
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionReport {
    pub commission_rate: Decimal,
    pub totals: Vec<CommissionTotal>,
}

/// GET /api/admin/commissions
async fn get_commissions(
    State(state): State<AppState>,
    _admin: AdminKey,
) -> Result<Json<ApiResponse<CommissionReport>>> {
    let totals = state
        .engine
        .commission_summary()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(ApiResponse::new(CommissionReport {
        commission_rate: state.engine.commission_rate(),
        totals,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListingUpdate {
    pub active: bool,
}

/// PUT /api/admin/instruments/:symbol
async fn update_listing(
    State(state): State<AppState>,
    _admin: AdminKey,
    Path(symbol): Path<String>,
    Json(update): Json<ListingUpdate>,
) -> Result<Json<ApiResponse<MarketInstrument>>> {
    if !state.prices.set_active(&symbol, update.active)? {
        return Err(AppError::NotFound(format!("Instrument {} not found", symbol)));
    }
    let instrument = state
        .prices
        .market_instrument(&symbol)?
        .ok_or_else(|| AppError::NotFound(format!("Instrument {} not found", symbol)))?;
    Ok(Json(ApiResponse::new(instrument)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/commissions", get(get_commissions))
        .route("/instruments/:symbol", put(update_listing))
}

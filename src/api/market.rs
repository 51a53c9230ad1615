use super::admin::AdminKey;
use super::ApiResponse;
use crate::error::{AppError, Result};
use crate::services::IngestionReport;
use crate::types::MarketInstrument;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

/// GET /api/market/instruments
async fn list_instruments(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<MarketInstrument>>>> {
    let instruments = state.prices.list_market()?;
    Ok(Json(ApiResponse::new(instruments)))
}

/// GET /api/market/instruments/:symbol
async fn get_instrument(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<MarketInstrument>>> {
    let instrument = state
        .prices
        .market_instrument(&symbol)?
        .ok_or_else(|| AppError::NotFound(format!("Instrument {} not found", symbol)))?;
    Ok(Json(ApiResponse::new(instrument)))
}

/// POST /api/market/refresh
///
/// Run price ingestion now instead of waiting for the next tick.
async fn refresh(
    State(state): State<AppState>,
    _admin: AdminKey,
) -> Result<Json<ApiResponse<IngestionReport>>> {
    let report = state
        .ingestor
        .refresh()
        .await
        .map_err(|e| AppError::ExternalApi(e.to_string()))?;
    Ok(Json(ApiResponse::new(report)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/instruments", get(list_instruments))
        .route("/instruments/:symbol", get(get_instrument))
        .route("/refresh", post(refresh))
}

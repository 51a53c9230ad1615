//! Trade Engine
//!
//! Executes one trade end-to-end:
//! - Validation (quantity, identity, caller, instrument, price), no writes
//! - Pricing via `TradeQuote::compute` at the current snapshot and rate
//! - Settlement under the user's lock in a single SQLite transaction
//!
//! Rejections the caller can correct write nothing. Operational failures
//! after settlement began leave one `failed` transaction for audit.

use crate::services::price_book::PriceBookError;
use crate::services::sqlite_store::{SettlementError, SettlementPlan};
use crate::services::{IdentityGate, PriceBook, RateSource, SqliteStore, UserLocks};
use crate::types::{
    CommissionTotal, StartingBalances, TradeQuote, TradeRequest, TradeResponse, TradeResult,
    Transaction,
};
use axum::{http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Trade and account operation errors.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Identity not verified")]
    Unverified,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Instrument unavailable: {0}")]
    InstrumentUnavailable(String),

    #[error("No price available for {0}")]
    PriceUnavailable(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Insufficient holdings: need {needed}, have {available}")]
    InsufficientHoldings { needed: Decimal, available: Decimal },

    #[error("Payment not confirmed: {0}")]
    PaymentFailed(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl TradeError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            TradeError::InvalidAmount(_) => "INVALID_AMOUNT",
            TradeError::Unverified => "UNVERIFIED",
            TradeError::Unauthorized(_) => "UNAUTHORIZED",
            TradeError::InstrumentUnavailable(_) => "INSTRUMENT_UNAVAILABLE",
            TradeError::PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            TradeError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TradeError::InsufficientHoldings { .. } => "INSUFFICIENT_HOLDINGS",
            TradeError::PaymentFailed(_) => "PAYMENT_FAILED",
            TradeError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// Short message safe to show in the mini-app.
    pub fn user_message(&self) -> String {
        match self {
            TradeError::InvalidAmount(_) => "Please enter a valid amount.".to_string(),
            TradeError::Unverified => "Please verify your identity before trading.".to_string(),
            TradeError::Unauthorized(_) => "You are not allowed to use this account.".to_string(),
            TradeError::InstrumentUnavailable(symbol) => {
                format!("{} is not available for trading.", symbol)
            }
            TradeError::PriceUnavailable(symbol) => {
                format!("No current price for {}. Please try again shortly.", symbol)
            }
            TradeError::InsufficientBalance { .. } => "Insufficient balance.".to_string(),
            TradeError::InsufficientHoldings { .. } => {
                "You do not hold enough tokens to sell.".to_string()
            }
            TradeError::PaymentFailed(_) => "Payment could not be confirmed.".to_string(),
            TradeError::PersistenceFailure(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}

impl IntoResponse for TradeError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            TradeError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            TradeError::Unverified | TradeError::Unauthorized(_) => StatusCode::FORBIDDEN,
            TradeError::InstrumentUnavailable(_) => StatusCode::NOT_FOUND,
            TradeError::PriceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TradeError::InsufficientBalance { .. } | TradeError::InsufficientHoldings { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TradeError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            TradeError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = TradeResponse::rejected(self.user_message(), self.code());
        (status, Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for TradeError {
    fn from(e: rusqlite::Error) -> Self {
        TradeError::PersistenceFailure(e.to_string())
    }
}

impl From<SettlementError> for TradeError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::InsufficientBalance { needed, available } => {
                TradeError::InsufficientBalance { needed, available }
            }
            SettlementError::InsufficientHoldings { needed, available } => {
                TradeError::InsufficientHoldings { needed, available }
            }
            SettlementError::DuplicateReference(reference) => {
                TradeError::PaymentFailed(format!("reference {} already applied", reference))
            }
            SettlementError::Overflow(e) => TradeError::InvalidAmount(e.to_string()),
            other => TradeError::PersistenceFailure(other.to_string()),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fraction of gross value charged per trade
    pub commission_rate: Decimal,
    /// Balances for accounts created on first trade
    pub starting_balances: StartingBalances,
    /// Bound on identity checks, rate lookups and lock waits
    pub external_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::new(75, 4), // 0.75%
            starting_balances: StartingBalances::default(),
            external_timeout: Duration::from_secs(5),
        }
    }
}

/// Trade execution and settlement.
#[derive(Clone)]
pub struct TradeEngine {
    sqlite: Arc<SqliteStore>,
    prices: PriceBook,
    rates: Arc<dyn RateSource>,
    identity: Arc<dyn IdentityGate>,
    locks: UserLocks,
    config: EngineConfig,
}

impl TradeEngine {
    pub fn new(
        sqlite: Arc<SqliteStore>,
        prices: PriceBook,
        rates: Arc<dyn RateSource>,
        identity: Arc<dyn IdentityGate>,
        locks: UserLocks,
        config: EngineConfig,
    ) -> Self {
        Self {
            sqlite,
            prices,
            rates,
            identity,
            locks,
            config,
        }
    }

    pub fn commission_rate(&self) -> Decimal {
        self.config.commission_rate
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute a trade for the authenticated `actor`.
    pub async fn execute_trade(&self, actor: &str, request: &TradeRequest) -> Result<TradeResult, TradeError> {
        let plan = match self.prepare(actor, request).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Rejected {} of {} for {}: {}", request.trade_type, request.instrument_symbol, actor, e);
                return Err(e);
            }
        };

        self.sqlite
            .ensure_account(actor, self.config.starting_balances)
            .map_err(|e| {
                error!("Could not load account for {}: {}", actor, e);
                TradeError::from(e)
            })?;

        let Some(_guard) = self.locks.acquire(actor, self.config.external_timeout).await else {
            let reason = "timed out waiting for account lock";
            self.record_failure(&plan, reason);
            return Err(TradeError::PersistenceFailure(reason.to_string()));
        };

        match self.sqlite.settle_trade(&plan) {
            Ok(transaction) => {
                info!(
                    "{} {} {} @ {} for {} (commission {} USD)",
                    request.trade_type,
                    plan.quote.quantity,
                    plan.instrument.symbol,
                    plan.quote.price_usd,
                    actor,
                    plan.quote.commission_usd
                );
                Ok(TradeResult::from_transaction(request.trade_type, transaction))
            }
            Err(SettlementError::Storage(e)) => {
                error!("Settlement failed for {}: {}", actor, e);
                self.record_failure(&plan, &e.to_string());
                Err(TradeError::PersistenceFailure(e.to_string()))
            }
            Err(e) => {
                warn!("Rejected {} of {} for {}: {}", request.trade_type, plan.instrument.symbol, actor, e);
                Err(e.into())
            }
        }
    }

    /// Validate and price a request. Writes nothing.
    async fn prepare(&self, actor: &str, request: &TradeRequest) -> Result<SettlementPlan, TradeError> {
        if request.quantity <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }

        let proof = request
            .identity_proof
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(TradeError::Unverified)?;
        let verified = tokio::time::timeout(
            self.config.external_timeout,
            self.identity.is_verified(actor, proof),
        )
        .await
        .unwrap_or_else(|_| {
            warn!("Identity check timed out for {}", actor);
            false
        });
        if !verified {
            return Err(TradeError::Unverified);
        }

        if let Some(ref account_id) = request.account_id {
            if account_id != actor {
                return Err(TradeError::Unauthorized(format!(
                    "{} may not trade on account {}",
                    actor, account_id
                )));
            }
        }

        let symbol = request.instrument_symbol.trim().to_uppercase();
        let instrument = self
            .prices
            .instrument(&symbol)?
            .filter(|i| i.is_active)
            .ok_or_else(|| TradeError::InstrumentUnavailable(symbol.clone()))?;

        let snapshot = match self.prices.get_price(&symbol) {
            Ok(snapshot) if snapshot.is_tradable() => snapshot,
            Ok(_) | Err(PriceBookError::NotFound(_)) => {
                return Err(TradeError::PriceUnavailable(symbol))
            }
            Err(PriceBookError::Storage(e)) => return Err(e.into()),
        };

        let asset = request.settlement_asset;
        let usd_rate = tokio::time::timeout(self.config.external_timeout, self.rates.usd_rate(asset))
            .await
            .ok()
            .flatten()
            .ok_or_else(|| TradeError::PriceUnavailable(asset.to_string()))?;

        let quote = TradeQuote::compute(
            request.trade_type,
            request.quantity,
            snapshot.price_usd,
            self.config.commission_rate,
            usd_rate,
        )
        .ok_or_else(|| TradeError::InvalidAmount("trade value out of range".to_string()))?;

        debug!(
            "Quoted {} {} {}: gross {} USD, settle {} {}",
            request.trade_type, quote.quantity, symbol, quote.gross_usd, quote.settlement_amount, asset
        );

        Ok(SettlementPlan {
            user_id: actor.to_string(),
            instrument,
            trade_type: request.trade_type,
            asset,
            quote,
            commission_rate: self.config.commission_rate,
            identity_proof: Some(proof.to_string()),
        })
    }

    /// Best-effort audit row for a trade that did not settle.
    fn record_failure(&self, plan: &SettlementPlan, reason: &str) {
        let mut transaction: Transaction = plan.draft_transaction();
        transaction.fail(reason);
        if self.sqlite.record_failed_transaction(&transaction).is_ok() {
            debug!("Recorded failed transaction {}", transaction.id);
        }
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Commission totals per currency.
    pub fn commission_summary(&self) -> Result<Vec<CommissionTotal>, TradeError> {
        Ok(self.sqlite.commission_summary()?)
    }
}

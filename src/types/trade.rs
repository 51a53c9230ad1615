//! Trade Types
//!
//! Trade intents from the mini-app, the pure pricing of a trade, and the
//! result shapes returned to the client.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ledger::{SettlementAsset, Transaction, TransactionStatus};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Buy,
    Sell,
}

impl TradeType {
    /// Past-tense verb used in result summaries.
    pub fn past_tense(&self) -> &'static str {
        match self {
            TradeType::Buy => "Bought",
            TradeType::Sell => "Sold",
        }
    }
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::Buy => write!(f, "buy"),
            TradeType::Sell => write!(f, "sell"),
        }
    }
}

/// A trade intent submitted by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    /// Instrument symbol (e.g., "SPY")
    pub instrument_symbol: String,
    /// Units to buy or sell
    pub quantity: Decimal,
    pub trade_type: TradeType,
    pub settlement_asset: SettlementAsset,
    /// Nullifier hash from the identity check
    #[serde(default)]
    pub identity_proof: Option<String>,
    /// Account to trade on; must match the caller when present
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Pure economics of a trade at a given price and rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeQuote {
    pub quantity: Decimal,
    /// USD price per unit
    pub price_usd: Decimal,
    /// quantity * price
    pub gross_usd: Decimal,
    /// gross * commission rate
    pub commission_usd: Decimal,
    /// Buy: gross + commission. Sell: gross - commission.
    pub settlement_usd: Decimal,
    /// USD value of one unit of the settlement asset
    pub usd_rate: Decimal,
    /// settlement_usd expressed in the settlement asset
    pub settlement_amount: Decimal,
    /// Commission expressed in the settlement asset
    pub commission_amount: Decimal,
}

impl TradeQuote {
    /// Price a trade. Returns `None` if the arithmetic overflows or the rate
    /// is not positive.
    pub fn compute(
        trade_type: TradeType,
        quantity: Decimal,
        price_usd: Decimal,
        commission_rate: Decimal,
        usd_rate: Decimal,
    ) -> Option<Self> {
        if usd_rate <= Decimal::ZERO {
            return None;
        }

        let gross_usd = quantity.checked_mul(price_usd)?;
        let commission_usd = gross_usd.checked_mul(commission_rate)?;
        let settlement_usd = match trade_type {
            TradeType::Buy => gross_usd.checked_add(commission_usd)?,
            TradeType::Sell => gross_usd.checked_sub(commission_usd)?,
        };

        let (settlement_amount, commission_amount) = if usd_rate == Decimal::ONE {
            (settlement_usd, commission_usd)
        } else {
            (
                settlement_usd.checked_div(usd_rate)?,
                commission_usd.checked_div(usd_rate)?,
            )
        };

        Some(Self {
            quantity,
            price_usd,
            gross_usd,
            commission_usd,
            settlement_usd,
            usd_rate,
            settlement_amount,
            commission_amount,
        })
    }
}

/// Outcome of a successful trade.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResult {
    pub transaction_id: String,
    pub status: TransactionStatus,
    /// Human-readable summary, e.g. "Bought 2 SPY"
    pub message: String,
    pub transaction: Transaction,
}

impl TradeResult {
    pub fn from_transaction(trade_type: TradeType, transaction: Transaction) -> Self {
        let message = format!(
            "{} {} {}",
            trade_type.past_tense(),
            transaction.quantity.unwrap_or_default().normalize(),
            transaction.symbol.as_deref().unwrap_or_default()
        );
        Self {
            transaction_id: transaction.id.clone(),
            status: transaction.status,
            message,
            transaction,
        }
    }
}

/// Response body for the trade endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl TradeResponse {
    pub fn ok(result: TradeResult) -> Self {
        Self {
            success: true,
            transaction: Some(result.transaction),
            message: Some(result.message),
            error: None,
            code: None,
        }
    }

    pub fn rejected(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction: None,
            message: None,
            error: Some(error.into()),
            code: Some(code.into()),
        }
    }
}

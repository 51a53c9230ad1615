//! Price Ingestion
//!
//! Pulls index quotes from the quote source and replaces each active
//! instrument's snapshot. Best-effort per instrument: one failed quote does
//! not stop the others. Optionally refreshes the WLD/USD rate.

use crate::services::{PriceBook, RateBook};
use crate::sources::{Quote, QuoteError, QuoteSource};
use crate::types::{Instrument, PriceSnapshot, SettlementAsset};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Ticker of the WLD/USD pair on the quote source.
pub const WLD_USD_SYMBOL: &str = "WLD-USD";

/// Ingestion errors.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Quote(#[from] QuoteError),

    #[error("Quote request timed out")]
    Timeout,

    #[error("Invalid quote: {0}")]
    InvalidQuote(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// A symbol that could not be refreshed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionFailure {
    pub symbol: String,
    pub reason: String,
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    /// Symbols whose snapshot was replaced
    pub updated: Vec<String>,
    pub failed: Vec<IngestionFailure>,
    /// New WLD/USD rate, if refreshed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wld_usd_rate: Option<Decimal>,
}

/// Ingestion settings.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Divisor from index points to token price
    pub scale_factor: Decimal,
    pub refresh_wld_rate: bool,
    pub timeout: Duration,
}

/// Refreshes snapshots from an external quote source.
pub struct PriceIngestor {
    prices: PriceBook,
    rates: RateBook,
    quotes: Arc<dyn QuoteSource>,
    config: IngestionConfig,
}

impl PriceIngestor {
    pub fn new(prices: PriceBook, rates: RateBook, quotes: Arc<dyn QuoteSource>, config: IngestionConfig) -> Self {
        Self {
            prices,
            rates,
            quotes,
            config,
        }
    }

    /// Convert a raw index quote into a token snapshot.
    pub fn snapshot_from_quote(
        instrument: &Instrument,
        quote: &Quote,
        scale_factor: Decimal,
    ) -> Result<PriceSnapshot, IngestionError> {
        if scale_factor <= Decimal::ZERO {
            return Err(IngestionError::InvalidQuote("scale factor must be positive".to_string()));
        }

        let mut snapshot = PriceSnapshot::new(instrument, quote.regular_market_price / scale_factor);
        if !snapshot.is_tradable() {
            return Err(IngestionError::InvalidQuote(format!(
                "non-positive price for {}",
                quote.symbol
            )));
        }

        if let Some(previous) = quote.previous_close.filter(|p| !p.is_zero()) {
            let change_points = quote.regular_market_price - previous;
            snapshot.change_24h = Some(change_points / scale_factor);
            snapshot.change_percent_24h =
                Some((change_points / previous * Decimal::ONE_HUNDRED).round_dp(2));
        }
        snapshot.volume_24h = quote.volume;

        Ok(snapshot)
    }

    async fn fetch(&self, symbol: &str) -> Result<Quote, IngestionError> {
        tokio::time::timeout(self.config.timeout, self.quotes.fetch_quote(symbol))
            .await
            .map_err(|_| IngestionError::Timeout)?
            .map_err(IngestionError::from)
    }

    async fn refresh_instrument(&self, instrument: &Instrument) -> Result<PriceSnapshot, IngestionError> {
        let quote = self.fetch(instrument.index_family.quote_symbol()).await?;
        let snapshot = Self::snapshot_from_quote(instrument, &quote, self.config.scale_factor)?;
        self.prices.replace(snapshot.clone())?;
        Ok(snapshot)
    }

    /// Refresh every active instrument, then the WLD rate when enabled.
    pub async fn refresh(&self) -> Result<IngestionReport, IngestionError> {
        let instruments = self.prices.active_instruments()?;
        let mut report = IngestionReport::default();

        for instrument in &instruments {
            match self.refresh_instrument(instrument).await {
                Ok(snapshot) => {
                    debug!("{} refreshed at {} USD", snapshot.symbol, snapshot.price_usd);
                    report.updated.push(instrument.symbol.clone());
                }
                Err(e) => {
                    warn!("Failed to refresh {} from {}: {}", instrument.symbol, self.quotes.name(), e);
                    report.failed.push(IngestionFailure {
                        symbol: instrument.symbol.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if self.config.refresh_wld_rate {
            match self.fetch(WLD_USD_SYMBOL).await {
                Ok(quote) if self.rates.set_rate(SettlementAsset::Wld, quote.regular_market_price) => {
                    report.wld_usd_rate = Some(quote.regular_market_price);
                }
                Ok(quote) => report.failed.push(IngestionFailure {
                    symbol: WLD_USD_SYMBOL.to_string(),
                    reason: format!("rejected rate {}", quote.regular_market_price),
                }),
                Err(e) => {
                    warn!("Failed to refresh WLD rate: {}", e);
                    report.failed.push(IngestionFailure {
                        symbol: WLD_USD_SYMBOL.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Price refresh: {} updated, {} failed",
            report.updated.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Refresh on a fixed interval until the task is aborted.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    warn!("Price refresh failed: {}", e);
                }
            }
        })
    }
}

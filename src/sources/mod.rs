//! External market quote sources.

pub mod yahoo;

pub use yahoo::YahooQuoteSource;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Raw quote for one external ticker, before scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Ticker as known to the source (e.g., "^GSPC")
    pub symbol: String,
    pub regular_market_price: Decimal,
    pub previous_close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

/// Quote fetch errors.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Quote API error: {0}")]
    Api(String),

    #[error("No price in quote for {0}")]
    MissingPrice(String),
}

/// A source of market quotes keyed by external ticker.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Fetch the latest quote for a ticker.
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError>;
}

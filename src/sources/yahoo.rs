//! Yahoo Finance chart client for index quotes.
//!
//! Reads the `meta` block of the chart endpoint, which carries the latest
//! regular-market price and the previous close.

use super::{Quote, QuoteError, QuoteSource};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart response.
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: YahooMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    symbol: String,
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    regular_market_volume: Option<f64>,
}

fn to_decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(|v| Decimal::try_from(v).ok())
}

impl YahooChartResponse {
    fn into_quote(self, requested: &str) -> Result<Quote, QuoteError> {
        if let Some(error) = self.chart.error {
            return Err(QuoteError::Api(format!("{} - {}", error.code, error.description)));
        }

        let meta = self
            .chart
            .result
            .and_then(|results| results.into_iter().next())
            .map(|result| result.meta)
            .ok_or_else(|| QuoteError::Api(format!("Empty result for {}", requested)))?;

        let price = to_decimal(meta.regular_market_price)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| QuoteError::MissingPrice(meta.symbol.clone()))?;

        Ok(Quote {
            symbol: meta.symbol,
            regular_market_price: price,
            previous_close: to_decimal(meta.chart_previous_close.or(meta.previous_close)),
            volume: to_decimal(meta.regular_market_volume),
        })
    }
}

/// Yahoo Finance quote client.
pub struct YahooQuoteSource {
    client: Client,
    base_url: String,
}

impl YahooQuoteSource {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, QuoteError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// Create a client against another host (mirrors, tests).
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteSource {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range=1d&interval=1d",
            self.base_url, symbol
        );

        debug!("Fetching Yahoo Finance quote: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(QuoteError::Api(format!("HTTP {}", response.status())));
        }

        let data: YahooChartResponse = response.json().await?;
        data.into_quote(symbol)
    }
}

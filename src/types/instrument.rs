//! Instrument Types
//!
//! Index tokens, their price snapshots, and the market projection served to
//! the mini-app catalog.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Stock index family an instrument tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexFamily {
    Sp500,
    Nasdaq,
    Dow,
    Ftse,
    Nikkei,
    Dax,
}

impl IndexFamily {
    /// All supported families, in catalog order.
    pub const ALL: [IndexFamily; 6] = [
        IndexFamily::Sp500,
        IndexFamily::Nasdaq,
        IndexFamily::Dow,
        IndexFamily::Ftse,
        IndexFamily::Nikkei,
        IndexFamily::Dax,
    ];

    /// Ticker of the underlying index on the external quote source.
    pub fn quote_symbol(&self) -> &'static str {
        match self {
            IndexFamily::Sp500 => "^GSPC",
            IndexFamily::Nasdaq => "^IXIC",
            IndexFamily::Dow => "^DJI",
            IndexFamily::Ftse => "^FTSE",
            IndexFamily::Nikkei => "^N225",
            IndexFamily::Dax => "^GDAXI",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexFamily::Sp500 => "SP500",
            IndexFamily::Nasdaq => "NASDAQ",
            IndexFamily::Dow => "DOW",
            IndexFamily::Ftse => "FTSE",
            IndexFamily::Nikkei => "NIKKEI",
            IndexFamily::Dax => "DAX",
        }
    }
}

impl std::fmt::Display for IndexFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IndexFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexFamily::ALL
            .iter()
            .find(|family| family.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown index family: {}", s))
    }
}

/// A tradable index token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    /// Unique instrument ID
    pub id: String,
    /// Trading symbol (e.g., "SPY")
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Marketing description shown in the catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Index family tracked
    pub index_family: IndexFamily,
    /// Whether the instrument can currently be traded
    pub is_active: bool,
    /// When the instrument was listed (ms)
    pub created_at: i64,
}

impl Instrument {
    /// Create a new active instrument.
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        index_family: IndexFamily,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into().to_uppercase(),
            name: name.into(),
            description,
            index_family,
            is_active: true,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Latest known price for an instrument. Replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    /// Instrument this snapshot prices
    pub instrument_id: String,
    /// Instrument symbol (denormalized for lookups)
    pub symbol: String,
    /// Price per token in USD
    pub price_usd: Decimal,
    /// Absolute 24h change in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<Decimal>,
    /// 24h change in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent_24h: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<Decimal>,
    /// When the snapshot was taken (ms)
    pub updated_at: i64,
}

impl PriceSnapshot {
    /// Create a snapshot with only a price.
    pub fn new(instrument: &Instrument, price_usd: Decimal) -> Self {
        Self {
            instrument_id: instrument.id.clone(),
            symbol: instrument.symbol.clone(),
            price_usd,
            change_24h: None,
            change_percent_24h: None,
            market_cap: None,
            volume_24h: None,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Trading requires a strictly positive price.
    pub fn is_tradable(&self) -> bool {
        self.price_usd > Decimal::ZERO
    }
}

/// Catalog entry: an instrument with its current snapshot, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInstrument {
    #[serde(flatten)]
    pub instrument: Instrument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceSnapshot>,
}

/// Instruments listed on a fresh database.
pub fn default_catalog() -> Vec<Instrument> {
    vec![
        Instrument::new(
            "SPY",
            "S&P 500 Savings",
            Some("Tracks the 500 largest US companies.".to_string()),
            IndexFamily::Sp500,
        ),
        Instrument::new(
            "QQQ",
            "NASDAQ Tech Savings",
            Some("Tracks the most innovative US technology companies.".to_string()),
            IndexFamily::Nasdaq,
        ),
        Instrument::new(
            "DIA",
            "Dow Jones Classic Savings",
            Some("Tracks 30 established US blue-chip companies.".to_string()),
            IndexFamily::Dow,
        ),
        Instrument::new(
            "FTSE",
            "FTSE British Savings",
            Some("Tracks the 100 largest companies listed in London.".to_string()),
            IndexFamily::Ftse,
        ),
        Instrument::new(
            "NIK",
            "Nikkei Japanese Savings",
            Some("Tracks 225 leading companies listed in Tokyo.".to_string()),
            IndexFamily::Nikkei,
        ),
        Instrument::new(
            "DAX",
            "DAX German Savings",
            Some("Tracks 40 major companies listed in Frankfurt.".to_string()),
            IndexFamily::Dax,
        ),
    ]
}

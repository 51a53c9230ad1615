//! Settlement asset conversion rates.
//!
//! USDC is pegged at 1 USD. The WLD rate starts at the configured value and
//! is refreshed by price ingestion when enabled.

use crate::types::SettlementAsset;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Source of USD conversion rates for settlement assets.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// USD value of one unit of `asset`, if known.
    async fn usd_rate(&self, asset: SettlementAsset) -> Option<Decimal>;
}

/// In-memory rate table.
#[derive(Clone)]
pub struct RateBook {
    rates: Arc<DashMap<SettlementAsset, Decimal>>,
}

impl RateBook {
    /// Create a rate book with the initial WLD rate.
    pub fn new(wld_usd_rate: Decimal) -> Self {
        let rates = DashMap::new();
        rates.insert(SettlementAsset::Usdc, Decimal::ONE);
        rates.insert(SettlementAsset::Wld, wld_usd_rate);
        Self {
            rates: Arc::new(rates),
        }
    }

    /// Current rate for an asset.
    pub fn get(&self, asset: SettlementAsset) -> Option<Decimal> {
        if asset.is_usd_pegged() {
            return Some(Decimal::ONE);
        }
        self.rates.get(&asset).map(|r| *r)
    }

    /// Replace the rate for a floating asset. Returns false if rejected.
    pub fn set_rate(&self, asset: SettlementAsset, rate: Decimal) -> bool {
        if asset.is_usd_pegged() {
            warn!("Ignoring rate update for pegged asset {}", asset);
            return false;
        }
        if rate <= Decimal::ZERO {
            warn!("Ignoring non-positive {} rate {}", asset, rate);
            return false;
        }

        let previous = self.rates.insert(asset, rate);
        if previous != Some(rate) {
            info!("{} rate updated to {} USD", asset, rate);
        }
        true
    }
}

#[async_trait]
impl RateSource for RateBook {
    async fn usd_rate(&self, asset: SettlementAsset) -> Option<Decimal> {
        self.get(asset)
    }
}

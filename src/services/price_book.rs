//! Price Book
//!
//! Latest snapshot per instrument. Snapshots live in SQLite and are mirrored
//! in a DashMap keyed by symbol. `replace` swaps the whole map entry, so a
//! reader sees either the previous snapshot or the new one.

use crate::services::SqliteStore;
use crate::types::{Instrument, MarketInstrument, PriceSnapshot};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Price book errors.
#[derive(Debug, Error)]
pub enum PriceBookError {
    #[error("No price for {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Read-mostly store of the latest price per instrument.
#[derive(Clone)]
pub struct PriceBook {
    sqlite: Arc<SqliteStore>,
    /// symbol -> latest snapshot
    snapshots: Arc<DashMap<String, PriceSnapshot>>,
}

impl PriceBook {
    pub fn new(sqlite: Arc<SqliteStore>) -> Self {
        Self {
            sqlite,
            snapshots: Arc::new(DashMap::new()),
        }
    }

    /// Warm the cache from SQLite. Returns the number of snapshots loaded.
    pub fn load(&self) -> Result<usize, rusqlite::Error> {
        let snapshots = self.sqlite.list_price_snapshots()?;
        let count = snapshots.len();
        for snapshot in snapshots {
            self.snapshots.insert(snapshot.symbol.clone(), snapshot);
        }
        info!("Loaded {} price snapshots", count);
        Ok(count)
    }

    /// List any catalog instruments not yet in the database.
    pub fn seed_catalog(&self, catalog: &[Instrument]) -> Result<usize, rusqlite::Error> {
        let mut inserted = 0;
        for instrument in catalog {
            if self.sqlite.insert_instrument_if_absent(instrument)? {
                inserted += 1;
            }
        }
        if inserted > 0 {
            info!("Seeded {} instruments", inserted);
        }
        Ok(inserted)
    }

    /// Look up an instrument by symbol.
    pub fn instrument(&self, symbol: &str) -> Result<Option<Instrument>, rusqlite::Error> {
        self.sqlite.get_instrument_by_symbol(symbol)
    }

    /// Active instruments.
    pub fn active_instruments(&self) -> Result<Vec<Instrument>, rusqlite::Error> {
        self.sqlite.list_instruments(true)
    }

    /// Latest snapshot for a symbol.
    pub fn get_price(&self, symbol: &str) -> Result<PriceSnapshot, PriceBookError> {
        let symbol = symbol.to_uppercase();
        if let Some(snapshot) = self.snapshots.get(&symbol) {
            return Ok(snapshot.clone());
        }

        let instrument = self
            .sqlite
            .get_instrument_by_symbol(&symbol)?
            .ok_or_else(|| PriceBookError::NotFound(symbol.clone()))?;
        let snapshot = self
            .sqlite
            .get_price_snapshot(&instrument.id)?
            .ok_or_else(|| PriceBookError::NotFound(symbol.clone()))?;

        self.snapshots.insert(symbol, snapshot.clone());
        Ok(snapshot)
    }

    /// Replace the snapshot for an instrument, persisting it first.
    pub fn replace(&self, snapshot: PriceSnapshot) -> Result<(), rusqlite::Error> {
        self.sqlite.upsert_price_snapshot(&snapshot)?;
        debug!("{} -> {} USD", snapshot.symbol, snapshot.price_usd);
        self.snapshots.insert(snapshot.symbol.clone(), snapshot);
        Ok(())
    }

    /// List or delist an instrument. Returns false for unknown symbols.
    pub fn set_active(&self, symbol: &str, active: bool) -> Result<bool, rusqlite::Error> {
        let changed = self.sqlite.set_instrument_active(symbol, active)?;
        if changed {
            info!("{} {}", symbol.to_uppercase(), if active { "listed" } else { "delisted" });
        }
        Ok(changed)
    }

    /// Active instruments with their snapshots, for the catalog.
    pub fn list_market(&self) -> Result<Vec<MarketInstrument>, rusqlite::Error> {
        let instruments = self.sqlite.list_instruments(true)?;
        Ok(instruments
            .into_iter()
            .map(|instrument| {
                let price = self.get_price(&instrument.symbol).ok();
                MarketInstrument { instrument, price }
            })
            .collect())
    }

    /// One instrument with its snapshot.
    pub fn market_instrument(&self, symbol: &str) -> Result<Option<MarketInstrument>, rusqlite::Error> {
        let Some(instrument) = self.sqlite.get_instrument_by_symbol(symbol)? else {
            return Ok(None);
        };
        let price = self.get_price(&instrument.symbol).ok();
        Ok(Some(MarketInstrument { instrument, price }))
    }
}

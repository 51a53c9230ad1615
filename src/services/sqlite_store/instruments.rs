use super::{decimal_col, opt_decimal_col, parsed_col, SqliteStore};
use crate::types::{Instrument, PriceSnapshot};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const INSTRUMENT_COLUMNS: &str =
    "id, symbol, name, description, index_family, is_active, created_at";

const SNAPSHOT_COLUMNS: &str = "instrument_id, symbol, price_usd, change_24h, \
     change_percent_24h, market_cap, volume_24h, updated_at";

fn instrument_from_row(row: &Row<'_>) -> rusqlite::Result<Instrument> {
    Ok(Instrument {
        id: row.get(0)?,
        symbol: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        index_family: parsed_col(row, 4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<PriceSnapshot> {
    Ok(PriceSnapshot {
        instrument_id: row.get(0)?,
        symbol: row.get(1)?,
        price_usd: decimal_col(row, 2)?,
        change_24h: opt_decimal_col(row, 3)?,
        change_percent_24h: opt_decimal_col(row, 4)?,
        market_cap: opt_decimal_col(row, 5)?,
        volume_24h: opt_decimal_col(row, 6)?,
        updated_at: row.get(7)?,
    })
}

impl SqliteStore {
    // ========== Instrument Methods ==========

    /// Insert an instrument unless its symbol is already listed.
    ///
    /// Returns true if a row was inserted.
    pub fn insert_instrument_if_absent(&self, instrument: &Instrument) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO instruments
             (id, symbol, name, description, index_family, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                instrument.id,
                instrument.symbol,
                instrument.name,
                instrument.description,
                instrument.index_family.as_str(),
                instrument.is_active,
                instrument.created_at,
            ],
        )?;

        if inserted > 0 {
            debug!("Listed instrument {}", instrument.symbol);
        }
        Ok(inserted > 0)
    }

    /// Look up an instrument by symbol (case-insensitive).
    pub fn get_instrument_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM instruments WHERE symbol = ?1", INSTRUMENT_COLUMNS),
            params![symbol.to_uppercase()],
            instrument_from_row,
        )
        .optional()
    }

    /// List instruments ordered by symbol.
    pub fn list_instruments(&self, active_only: bool) -> Result<Vec<Instrument>, rusqlite::Error> {
        let conn = self.conn();
        let sql = if active_only {
            format!(
                "SELECT {} FROM instruments WHERE is_active = 1 ORDER BY symbol",
                INSTRUMENT_COLUMNS
            )
        } else {
            format!("SELECT {} FROM instruments ORDER BY symbol", INSTRUMENT_COLUMNS)
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], instrument_from_row)?;
        rows.collect()
    }

    /// Toggle whether an instrument can be traded. Returns false if unknown.
    pub fn set_instrument_active(&self, symbol: &str, active: bool) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE instruments SET is_active = ?1 WHERE symbol = ?2",
            params![active, symbol.to_uppercase()],
        )?;
        Ok(updated > 0)
    }

    // ========== Price Snapshot Methods ==========

    /// Replace the snapshot for an instrument.
    pub fn upsert_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO price_snapshots
             (instrument_id, symbol, price_usd, change_24h, change_percent_24h,
              market_cap, volume_24h, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(instrument_id) DO UPDATE SET
                symbol = excluded.symbol,
                price_usd = excluded.price_usd,
                change_24h = excluded.change_24h,
                change_percent_24h = excluded.change_percent_24h,
                market_cap = excluded.market_cap,
                volume_24h = excluded.volume_24h,
                updated_at = excluded.updated_at",
            params![
                snapshot.instrument_id,
                snapshot.symbol,
                snapshot.price_usd.to_string(),
                snapshot.change_24h.map(|d| d.to_string()),
                snapshot.change_percent_24h.map(|d| d.to_string()),
                snapshot.market_cap.map(|d| d.to_string()),
                snapshot.volume_24h.map(|d| d.to_string()),
                snapshot.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get the snapshot for an instrument.
    pub fn get_price_snapshot(&self, instrument_id: &str) -> Result<Option<PriceSnapshot>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM price_snapshots WHERE instrument_id = ?1",
                SNAPSHOT_COLUMNS
            ),
            params![instrument_id],
            snapshot_from_row,
        )
        .optional()
    }

    /// Load every stored snapshot.
    pub fn list_price_snapshots(&self) -> Result<Vec<PriceSnapshot>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM price_snapshots", SNAPSHOT_COLUMNS))?;
        let rows = stmt.query_map([], snapshot_from_row)?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexFamily;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insert_instrument_once() {
        let store = SqliteStore::new_in_memory().unwrap();
        let spy = Instrument::new("SPY", "S&P 500", None, IndexFamily::Sp500);

        assert!(store.insert_instrument_if_absent(&spy).unwrap());

        let duplicate = Instrument::new("SPY", "Other", None, IndexFamily::Sp500);
        assert!(!store.insert_instrument_if_absent(&duplicate).unwrap());

        let loaded = store.get_instrument_by_symbol("spy").unwrap().unwrap();
        assert_eq!(loaded, spy);
    }

    #[test]
    fn test_deactivated_instruments_are_filtered() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .insert_instrument_if_absent(&Instrument::new("SPY", "S&P", None, IndexFamily::Sp500))
            .unwrap();
        store
            .insert_instrument_if_absent(&Instrument::new("DAX", "DAX", None, IndexFamily::Dax))
            .unwrap();

        assert!(store.set_instrument_active("DAX", false).unwrap());
        assert!(!store.set_instrument_active("NOPE", false).unwrap());

        assert_eq!(store.list_instruments(true).unwrap().len(), 1);
        assert_eq!(store.list_instruments(false).unwrap().len(), 2);
    }

    #[test]
    fn test_snapshot_upsert_replaces_wholesale() {
        let store = SqliteStore::new_in_memory().unwrap();
        let spy = Instrument::new("SPY", "S&P", None, IndexFamily::Sp500);
        store.insert_instrument_if_absent(&spy).unwrap();

        let mut first = PriceSnapshot::new(&spy, dec!(50.25));
        first.change_24h = Some(dec!(1.5));
        store.upsert_price_snapshot(&first).unwrap();

        let second = PriceSnapshot::new(&spy, dec!(51));
        store.upsert_price_snapshot(&second).unwrap();

        let loaded = store.get_price_snapshot(&spy.id).unwrap().unwrap();
        assert_eq!(loaded.price_usd, dec!(51));
        assert!(loaded.change_24h.is_none());
        assert_eq!(store.list_price_snapshots().unwrap().len(), 1);
    }
}

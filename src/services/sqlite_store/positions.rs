use super::{decimal_col, SqliteStore};
use crate::types::Position;
use rusqlite::{params, Connection, OptionalExtension, Row};

const POSITION_COLUMNS: &str = "id, user_id, instrument_id, symbol, quantity, \
     average_buy_price, total_invested, realized_pnl, created_at, updated_at";

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        user_id: row.get(1)?,
        instrument_id: row.get(2)?,
        symbol: row.get(3)?,
        quantity: decimal_col(row, 4)?,
        average_buy_price: decimal_col(row, 5)?,
        total_invested: decimal_col(row, 6)?,
        realized_pnl: decimal_col(row, 7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

pub(super) fn read_position(
    conn: &Connection,
    user_id: &str,
    instrument_id: &str,
) -> rusqlite::Result<Option<Position>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM positions WHERE user_id = ?1 AND instrument_id = ?2",
            POSITION_COLUMNS
        ),
        params![user_id, instrument_id],
        position_from_row,
    )
    .optional()
}

/// Insert or update the (user, instrument) position.
pub(super) fn write_position(conn: &Connection, position: &Position) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO positions
         (id, user_id, instrument_id, symbol, quantity, average_buy_price,
          total_invested, realized_pnl, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(user_id, instrument_id) DO UPDATE SET
            quantity = excluded.quantity,
            average_buy_price = excluded.average_buy_price,
            total_invested = excluded.total_invested,
            realized_pnl = excluded.realized_pnl,
            updated_at = excluded.updated_at",
        params![
            position.id,
            position.user_id,
            position.instrument_id,
            position.symbol,
            position.quantity.to_string(),
            position.average_buy_price.to_string(),
            position.total_invested.to_string(),
            position.realized_pnl.to_string(),
            position.created_at,
            position.updated_at,
        ],
    )?;
    Ok(())
}

pub(super) fn delete_position(conn: &Connection, user_id: &str, instrument_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM positions WHERE user_id = ?1 AND instrument_id = ?2",
        params![user_id, instrument_id],
    )?;
    Ok(())
}

impl SqliteStore {
    // ========== Position Methods ==========

    /// Get a user's position in one instrument.
    pub fn get_position(&self, user_id: &str, instrument_id: &str) -> Result<Option<Position>, rusqlite::Error> {
        read_position(&self.conn(), user_id, instrument_id)
    }

    /// List a user's open positions ordered by symbol.
    pub fn list_positions(&self, user_id: &str) -> Result<Vec<Position>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM positions WHERE user_id = ?1 ORDER BY symbol",
            POSITION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], position_from_row)?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IndexFamily, Instrument, StartingBalances};
    use rust_decimal_macros::dec;

    fn setup() -> (SqliteStore, Instrument) {
        let store = SqliteStore::new_in_memory().unwrap();
        let spy = Instrument::new("SPY", "S&P", None, IndexFamily::Sp500);
        store.insert_instrument_if_absent(&spy).unwrap();
        store.ensure_account("0xuser", StartingBalances::default()).unwrap();
        (store, spy)
    }

    #[test]
    fn test_write_then_update_position() {
        let (store, spy) = setup();
        let mut position = Position::open("0xuser".to_string(), &spy, dec!(10), dec!(5)).unwrap();
        write_position(&store.conn(), &position).unwrap();

        position.apply_buy(dec!(10), dec!(7)).unwrap();
        write_position(&store.conn(), &position).unwrap();

        let loaded = store.get_position("0xuser", &spy.id).unwrap().unwrap();
        assert_eq!(loaded.quantity, dec!(20));
        assert_eq!(loaded.average_buy_price, dec!(6));
        assert_eq!(store.list_positions("0xuser").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_position() {
        let (store, spy) = setup();
        let position = Position::open("0xuser".to_string(), &spy, dec!(1), dec!(5)).unwrap();
        write_position(&store.conn(), &position).unwrap();

        delete_position(&store.conn(), "0xuser", &spy.id).unwrap();
        assert!(store.get_position("0xuser", &spy.id).unwrap().is_none());
        assert!(store.list_positions("0xuser").unwrap().is_empty());
    }
}

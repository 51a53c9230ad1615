use super::{decimal_col, opt_decimal_col, parsed_col, SqliteStore};
use crate::types::{CommissionEarning, CommissionTotal, SettlementAsset, Transaction};
use rust_decimal::Decimal;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use tracing::warn;

const TRANSACTION_COLUMNS: &str = "id, user_id, transaction_type, instrument_id, symbol, \
     quantity, price_per_unit, total_amount, commission_amount, settlement_amount, \
     settlement_asset, status, identity_proof, external_reference, created_at, \
     completed_at, metadata";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let metadata: String = row.get(16)?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        transaction_type: parsed_col(row, 2)?,
        instrument_id: row.get(3)?,
        symbol: row.get(4)?,
        quantity: opt_decimal_col(row, 5)?,
        price_per_unit: opt_decimal_col(row, 6)?,
        total_amount: decimal_col(row, 7)?,
        commission_amount: decimal_col(row, 8)?,
        settlement_amount: decimal_col(row, 9)?,
        settlement_asset: parsed_col(row, 10)?,
        status: parsed_col(row, 11)?,
        identity_proof: row.get(12)?,
        external_reference: row.get(13)?,
        created_at: row.get(14)?,
        completed_at: row.get(15)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
    })
}

fn commission_from_row(row: &Row<'_>) -> rusqlite::Result<CommissionEarning> {
    Ok(CommissionEarning {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        amount: decimal_col(row, 2)?,
        currency: parsed_col(row, 3)?,
        rate: decimal_col(row, 4)?,
        earned_at: row.get(5)?,
    })
}

/// Append a transaction to the log.
pub(super) fn insert_transaction(conn: &Connection, tx: &Transaction) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO transactions ({}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            TRANSACTION_COLUMNS
        ),
        params![
            tx.id,
            tx.user_id,
            tx.transaction_type.as_str(),
            tx.instrument_id,
            tx.symbol,
            tx.quantity.map(|d| d.to_string()),
            tx.price_per_unit.map(|d| d.to_string()),
            tx.total_amount.to_string(),
            tx.commission_amount.to_string(),
            tx.settlement_amount.to_string(),
            tx.settlement_asset.as_str(),
            tx.status.as_str(),
            tx.identity_proof,
            tx.external_reference,
            tx.created_at,
            tx.completed_at,
            tx.metadata.to_string(),
        ],
    )?;
    Ok(())
}

pub(super) fn insert_commission(conn: &Connection, earning: &CommissionEarning) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO commission_earnings (id, transaction_id, amount, currency, rate, earned_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            earning.id,
            earning.transaction_id,
            earning.amount.to_string(),
            earning.currency.as_str(),
            earning.rate.to_string(),
            earning.earned_at,
        ],
    )?;
    Ok(())
}

pub(super) fn reference_exists(conn: &Connection, reference: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM transactions WHERE external_reference = ?1)",
        params![reference],
        |row| row.get(0),
    )
}

impl SqliteStore {
    // ========== Transaction Log Methods ==========

    /// Record a transaction that did not settle. Ledgers are not touched.
    pub fn record_failed_transaction(&self, tx: &Transaction) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        insert_transaction(&conn, tx).map_err(|e| {
            warn!("Could not record failed transaction {}: {}", tx.id, e);
            e
        })
    }

    /// Get a transaction by id.
    pub fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS),
            params![id],
            transaction_from_row,
        )
        .optional()
    }

    /// A user's transactions, newest first.
    pub fn list_transactions(&self, user_id: &str, limit: u32) -> Result<Vec<Transaction>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ?1 ORDER BY seq DESC LIMIT ?2",
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id, limit], transaction_from_row)?;
        rows.collect()
    }

    // ========== Commission Ledger Methods ==========

    /// Commission recorded for a trade.
    pub fn get_commission_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<CommissionEarning>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, transaction_id, amount, currency, rate, earned_at
             FROM commission_earnings WHERE transaction_id = ?1",
            params![transaction_id],
            commission_from_row,
        )
        .optional()
    }

    /// Commission totals per currency.
    ///
    /// Summed in Rust since amounts are stored as text.
    pub fn commission_summary(&self) -> Result<Vec<CommissionTotal>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT currency, amount FROM commission_earnings")?;
        let rows = stmt.query_map([], |row| {
            let currency: SettlementAsset = parsed_col(row, 0)?;
            Ok((currency, decimal_col(row, 1)?))
        })?;

        let mut totals: BTreeMap<&'static str, CommissionTotal> = BTreeMap::new();
        for row in rows {
            let (currency, amount) = row?;
            let entry = totals.entry(currency.as_str()).or_insert(CommissionTotal {
                currency,
                total: Decimal::ZERO,
                trades: 0,
            });
            entry.total += amount;
            entry.trades += 1;
        }

        Ok(totals.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;
    use rust_decimal_macros::dec;

    fn deposit(user: &str, amount: Decimal) -> Transaction {
        let mut tx = Transaction::new(
            user.to_string(),
            TransactionType::Deposit,
            SettlementAsset::Usdc,
            amount,
        );
        tx.complete();
        tx
    }

    #[test]
    fn test_transactions_newest_first() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = deposit("0xuser", dec!(1));
        let second = deposit("0xuser", dec!(2));
        let third = deposit("0xuser", dec!(3));
        for tx in [&first, &second, &third] {
            insert_transaction(&store.conn(), tx).unwrap();
        }
        insert_transaction(&store.conn(), &deposit("0xother", dec!(9))).unwrap();

        let listed = store.list_transactions("0xuser", 50).unwrap();
        let ids: Vec<&str> = listed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![third.id.as_str(), second.id.as_str(), first.id.as_str()]);

        assert_eq!(store.list_transactions("0xuser", 2).unwrap().len(), 2);
    }

    #[test]
    fn test_transaction_round_trip() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut tx = deposit("0xuser", dec!(12.5));
        tx.external_reference = Some("pay-1".to_string());
        tx.metadata = serde_json::json!({ "note": "first" });
        insert_transaction(&store.conn(), &tx).unwrap();

        let loaded = store.get_transaction(&tx.id).unwrap().unwrap();
        assert_eq!(loaded, tx);
        assert!(reference_exists(&store.conn(), "pay-1").unwrap());
        assert!(!reference_exists(&store.conn(), "pay-2").unwrap());
    }

    #[test]
    fn test_failed_transaction_recorded() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut tx = Transaction::new(
            "0xuser".to_string(),
            TransactionType::Buy,
            SettlementAsset::Usdc,
            dec!(10),
        );
        tx.fail("storage unavailable");
        store.record_failed_transaction(&tx).unwrap();

        let loaded = store.get_transaction(&tx.id).unwrap().unwrap();
        assert_eq!(loaded.status, crate::types::TransactionStatus::Failed);
        assert_eq!(loaded.metadata["failureReason"], "storage unavailable");
    }

    #[test]
    fn test_commission_summary_groups_by_currency() {
        let store = SqliteStore::new_in_memory().unwrap();
        for (amount, currency) in [
            (dec!(0.15), SettlementAsset::Usdc),
            (dec!(0.35), SettlementAsset::Usdc),
            (dec!(0.1), SettlementAsset::Wld),
        ] {
            let tx = deposit("0xuser", dec!(1));
            insert_transaction(&store.conn(), &tx).unwrap();
            let earning = CommissionEarning::new(tx.id.clone(), amount, currency, dec!(0.0075));
            insert_commission(&store.conn(), &earning).unwrap();
        }

        let summary = store.commission_summary().unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].currency, SettlementAsset::Usdc);
        assert_eq!(summary[0].total, dec!(0.50));
        assert_eq!(summary[0].trades, 2);
        assert_eq!(summary[1].total, dec!(0.1));
    }
}

//! SQLite persistence layer for the ledgers.
//!
//! One connection guarded by a mutex is the single writer. Every settlement
//! runs inside one SQLite transaction on that connection, so the account,
//! position, transaction and commission ledgers change together or not at all.
//!
//! Money and quantities are stored as canonical decimal strings.

mod accounts;
mod identity;
mod instruments;
mod positions;
mod settlement;
mod transactions;

pub use settlement::{SettlementError, SettlementPlan};

use rust_decimal::Decimal;
use rusqlite::{types::Type, Connection, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// How long a statement waits on a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite store for instruments, snapshots and the ledgers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Lock the connection. A poisoned lock is recovered: every write runs in
    /// a transaction, so a panic mid-write leaves nothing half-applied.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn();

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS instruments (
                id TEXT PRIMARY KEY,
                symbol TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                index_family TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS price_snapshots (
                instrument_id TEXT PRIMARY KEY REFERENCES instruments(id),
                symbol TEXT NOT NULL,
                price_usd TEXT NOT NULL,
                change_24h TEXT,
                change_percent_24h TEXT,
                market_cap TEXT,
                volume_24h TEXT,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS accounts (
                user_id TEXT PRIMARY KEY,
                usdc_balance TEXT NOT NULL,
                wld_balance TEXT NOT NULL,
                total_deposited_usdc TEXT NOT NULL,
                total_deposited_wld TEXT NOT NULL,
                total_withdrawn_usdc TEXT NOT NULL,
                total_withdrawn_wld TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES accounts(user_id),
                instrument_id TEXT NOT NULL REFERENCES instruments(id),
                symbol TEXT NOT NULL,
                quantity TEXT NOT NULL,
                average_buy_price TEXT NOT NULL,
                total_invested TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id, instrument_id)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                instrument_id TEXT,
                symbol TEXT,
                quantity TEXT,
                price_per_unit TEXT,
                total_amount TEXT NOT NULL,
                commission_amount TEXT NOT NULL,
                settlement_amount TEXT NOT NULL,
                settlement_asset TEXT NOT NULL,
                status TEXT NOT NULL,
                identity_proof TEXT,
                external_reference TEXT UNIQUE,
                created_at INTEGER NOT NULL,
                completed_at INTEGER,
                metadata TEXT NOT NULL DEFAULT 'null'
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_seq
                ON transactions(user_id, seq);

            CREATE TABLE IF NOT EXISTS commission_earnings (
                id TEXT PRIMARY KEY,
                transaction_id TEXT UNIQUE NOT NULL REFERENCES transactions(id),
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                rate TEXT NOT NULL,
                earned_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS identity_proofs (
                nullifier_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                verification_level TEXT NOT NULL,
                verified_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_identity_proofs_user
                ON identity_proofs(user_id);",
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }
}

// ========== Column Helpers ==========

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Read a decimal stored as text.
pub(crate) fn decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text).map_err(|e| conversion_error(idx, e))
}

/// Read a nullable decimal stored as text.
pub(crate) fn opt_decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| Decimal::from_str(&t).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Read a text column into any `FromStr` enum.
pub(crate) fn parsed_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e: String| conversion_error(idx, e))
}

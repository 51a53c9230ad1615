use super::{decimal_col, SqliteStore};
use crate::types::{Account, StartingBalances};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        user_id: row.get(0)?,
        usdc_balance: decimal_col(row, 1)?,
        wld_balance: decimal_col(row, 2)?,
        total_deposited_usdc: decimal_col(row, 3)?,
        total_deposited_wld: decimal_col(row, 4)?,
        total_withdrawn_usdc: decimal_col(row, 5)?,
        total_withdrawn_wld: decimal_col(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Read an account on an open connection or transaction.
pub(super) fn read_account(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        "SELECT user_id, usdc_balance, wld_balance, total_deposited_usdc, total_deposited_wld,
                total_withdrawn_usdc, total_withdrawn_wld, created_at, updated_at
         FROM accounts WHERE user_id = ?1",
        params![user_id],
        account_from_row,
    )
    .optional()
}

/// Persist balances and counters of an existing account.
pub(super) fn write_account(conn: &Connection, account: &Account) -> rusqlite::Result<()> {
    let updated = conn.execute(
        "UPDATE accounts SET
            usdc_balance = ?2,
            wld_balance = ?3,
            total_deposited_usdc = ?4,
            total_deposited_wld = ?5,
            total_withdrawn_usdc = ?6,
            total_withdrawn_wld = ?7,
            updated_at = ?8
         WHERE user_id = ?1",
        params![
            account.user_id,
            account.usdc_balance.to_string(),
            account.wld_balance.to_string(),
            account.total_deposited_usdc.to_string(),
            account.total_deposited_wld.to_string(),
            account.total_withdrawn_usdc.to_string(),
            account.total_withdrawn_wld.to_string(),
            account.updated_at,
        ],
    )?;

    if updated == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

impl SqliteStore {
    // ========== Account Methods ==========

    /// Get the account for a user, creating it with the starting balances if
    /// it does not exist. Concurrent first calls create exactly one row.
    pub fn ensure_account(
        &self,
        user_id: &str,
        starting: StartingBalances,
    ) -> Result<Account, rusqlite::Error> {
        let conn = self.conn();
        let fresh = Account::new(user_id.to_string(), starting);

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO accounts
             (user_id, usdc_balance, wld_balance, total_deposited_usdc, total_deposited_wld,
              total_withdrawn_usdc, total_withdrawn_wld, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                fresh.user_id,
                fresh.usdc_balance.to_string(),
                fresh.wld_balance.to_string(),
                fresh.total_deposited_usdc.to_string(),
                fresh.total_deposited_wld.to_string(),
                fresh.total_withdrawn_usdc.to_string(),
                fresh.total_withdrawn_wld.to_string(),
                fresh.created_at,
                fresh.updated_at,
            ],
        )?;

        if inserted > 0 {
            info!("Created account for {}", user_id);
        }

        read_account(&conn, user_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Get an account without creating it.
    pub fn get_account(&self, user_id: &str) -> Result<Option<Account>, rusqlite::Error> {
        read_account(&self.conn(), user_id)
    }
}

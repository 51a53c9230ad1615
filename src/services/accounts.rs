//! Account Service
//!
//! Lazily created accounts, wallet deposits and withdrawals, and the
//! portfolio and history queries behind the account screens.
//!
//! Deposits and withdrawals hold the same per-user lock as trades, so a
//! withdrawal can never race a buy for the same balance.

use crate::services::sqlite_store::SettlementError;
use crate::services::{
    PaymentStatus, PaymentVerifier, PriceBook, SqliteStore, TradeError, UserLockGuard, UserLocks,
};
use crate::types::{
    Account, CommissionEarning, Holding, SettlementAsset, StartingBalances, Transaction,
    TransactionType,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default number of transactions returned by history queries.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Largest history page.
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Account ledger operations outside of trading.
#[derive(Clone)]
pub struct AccountService {
    sqlite: Arc<SqliteStore>,
    prices: PriceBook,
    payments: Arc<dyn PaymentVerifier>,
    locks: UserLocks,
    starting_balances: StartingBalances,
    timeout: Duration,
}

impl AccountService {
    pub fn new(
        sqlite: Arc<SqliteStore>,
        prices: PriceBook,
        payments: Arc<dyn PaymentVerifier>,
        locks: UserLocks,
        starting_balances: StartingBalances,
        timeout: Duration,
    ) -> Self {
        Self {
            sqlite,
            prices,
            payments,
            locks,
            starting_balances,
            timeout,
        }
    }

    /// Get a user's account, creating it on first access.
    pub fn get_or_create_account(&self, user_id: &str) -> Result<Account, TradeError> {
        Ok(self.sqlite.ensure_account(user_id, self.starting_balances)?)
    }

    /// Credit a wallet payment once the payment API confirms it.
    pub async fn deposit(
        &self,
        user_id: &str,
        asset: SettlementAsset,
        amount: Decimal,
        reference: &str,
    ) -> Result<Transaction, TradeError> {
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(format!("deposit must be positive, got {}", amount)));
        }
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(TradeError::PaymentFailed("missing payment reference".to_string()));
        }

        let status = tokio::time::timeout(self.timeout, self.payments.confirm(reference, asset, amount))
            .await
            .unwrap_or_else(|_| {
                warn!("Payment confirmation timed out for {}", reference);
                PaymentStatus::Pending
            });
        if status != PaymentStatus::Success {
            warn!("Deposit {} for {} not confirmed: {:?}", reference, user_id, status);
            return Err(TradeError::PaymentFailed(format!("payment {} is {:?}", reference, status)));
        }

        self.get_or_create_account(user_id)?;
        let _guard = self.lock(user_id).await?;

        match self.sqlite.apply_deposit(user_id, asset, amount, reference) {
            Ok(tx) => Ok(tx),
            Err(SettlementError::Storage(e)) => {
                error!("Deposit {} for {} failed: {}", reference, user_id, e);
                self.record_failure(user_id, TransactionType::Deposit, asset, amount, &e.to_string());
                Err(TradeError::PersistenceFailure(e.to_string()))
            }
            Err(e) => {
                warn!("Deposit {} for {} rejected: {}", reference, user_id, e);
                Err(e.into())
            }
        }
    }

    /// Withdraw from a balance.
    pub async fn withdraw(
        &self,
        user_id: &str,
        asset: SettlementAsset,
        amount: Decimal,
    ) -> Result<Transaction, TradeError> {
        if amount <= Decimal::ZERO {
            return Err(TradeError::InvalidAmount(format!("withdrawal must be positive, got {}", amount)));
        }

        self.get_or_create_account(user_id)?;
        let _guard = self.lock(user_id).await?;

        match self.sqlite.apply_withdrawal(user_id, asset, amount) {
            Ok(tx) => Ok(tx),
            Err(SettlementError::Storage(e)) => {
                error!("Withdrawal for {} failed: {}", user_id, e);
                self.record_failure(user_id, TransactionType::Withdrawal, asset, amount, &e.to_string());
                Err(TradeError::PersistenceFailure(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Non-zero positions valued at the latest snapshots.
    pub fn holdings(&self, user_id: &str) -> Result<Vec<Holding>, TradeError> {
        let positions = self.sqlite.list_positions(user_id)?;
        let mut holdings = Vec::with_capacity(positions.len());

        for position in positions {
            let Some(instrument) = self.prices.instrument(&position.symbol)? else {
                warn!("Position {} references unknown instrument {}", position.id, position.symbol);
                continue;
            };
            let snapshot = self.prices.get_price(&instrument.symbol).ok();
            holdings.push(Holding::value(position, &instrument, snapshot.as_ref()));
        }

        Ok(holdings)
    }

    /// Transaction history, newest first.
    pub fn transactions(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<Transaction>, TradeError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.sqlite.list_transactions(user_id, limit)?)
    }

    /// One of the user's transactions with its commission, if any.
    pub fn transaction(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<(Transaction, Option<CommissionEarning>)>, TradeError> {
        let Some(tx) = self
            .sqlite
            .get_transaction(transaction_id)?
            .filter(|tx| tx.user_id == user_id)
        else {
            return Ok(None);
        };
        let commission = self.sqlite.get_commission_for_transaction(&tx.id)?;
        Ok(Some((tx, commission)))
    }

    async fn lock(&self, user_id: &str) -> Result<UserLockGuard, TradeError> {
        self.locks.acquire(user_id, self.timeout).await.ok_or_else(|| {
            warn!("Timed out waiting for account lock of {}", user_id);
            TradeError::PersistenceFailure("timed out waiting for account lock".to_string())
        })
    }

    fn record_failure(
        &self,
        user_id: &str,
        transaction_type: TransactionType,
        asset: SettlementAsset,
        amount: Decimal,
        reason: &str,
    ) {
        let mut tx = Transaction::new(user_id.to_string(), transaction_type, asset, amount);
        tx.fail(reason);
        if self.sqlite.record_failed_transaction(&tx).is_ok() {
            info!("Recorded failed {} {}", transaction_type, tx.id);
        }
    }
}

//! Atomic settlement of trades, deposits and withdrawals.
//!
//! Each operation opens one SQLite transaction, checks sufficiency against the
//! rows it reads inside that transaction, then writes the transaction log, the
//! commission ledger, the account and the position in that order. Any error
//! drops the transaction, which rolls every write back.

use super::accounts::{read_account, write_account};
use super::positions::{delete_position, read_position, write_position};
use super::transactions::{insert_commission, insert_transaction, reference_exists};
use super::SqliteStore;
use crate::types::{
    CommissionEarning, Instrument, LedgerOverflow, Position, SettlementAsset, TradeQuote, TradeType,
    Transaction, TransactionType,
};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

/// Why a settlement did not commit.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Insufficient holdings: need {needed}, have {available}")]
    InsufficientHoldings { needed: Decimal, available: Decimal },

    #[error("Payment reference already applied: {0}")]
    DuplicateReference(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Amount out of range: {0}")]
    Overflow(#[from] LedgerOverflow),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Everything needed to settle one priced trade.
#[derive(Debug, Clone)]
pub struct SettlementPlan {
    pub user_id: String,
    pub instrument: Instrument,
    pub trade_type: TradeType,
    pub asset: SettlementAsset,
    pub quote: TradeQuote,
    pub commission_rate: Decimal,
    pub identity_proof: Option<String>,
}

impl SettlementPlan {
    /// The transaction row this plan would record, still pending.
    pub fn draft_transaction(&self) -> Transaction {
        let transaction_type = match self.trade_type {
            TradeType::Buy => TransactionType::Buy,
            TradeType::Sell => TransactionType::Sell,
        };
        let mut tx = Transaction::new(
            self.user_id.clone(),
            transaction_type,
            self.asset,
            self.quote.gross_usd,
        );
        tx.instrument_id = Some(self.instrument.id.clone());
        tx.symbol = Some(self.instrument.symbol.clone());
        tx.quantity = Some(self.quote.quantity);
        tx.price_per_unit = Some(self.quote.price_usd);
        tx.commission_amount = self.quote.commission_usd;
        tx.settlement_amount = self.quote.settlement_amount;
        tx.identity_proof = self.identity_proof.clone();
        tx
    }
}

impl SqliteStore {
    /// Settle a priced trade in one storage transaction.
    pub fn settle_trade(&self, plan: &SettlementPlan) -> Result<Transaction, SettlementError> {
        let mut conn = self.conn();
        let db_tx = conn.transaction()?;

        let mut account = read_account(&db_tx, &plan.user_id)?
            .ok_or_else(|| SettlementError::AccountNotFound(plan.user_id.clone()))?;
        let existing = read_position(&db_tx, &plan.user_id, &plan.instrument.id)?;
        let quote = &plan.quote;
        let mut transaction = plan.draft_transaction();

        let (position, closed) = match plan.trade_type {
            TradeType::Buy => {
                let available = account.balance(plan.asset);
                if !account.debit(plan.asset, quote.settlement_amount) {
                    return Err(SettlementError::InsufficientBalance {
                        needed: quote.settlement_amount,
                        available,
                    });
                }

                let position = match existing {
                    Some(mut position) => {
                        position.apply_buy(quote.quantity, quote.price_usd)?;
                        position
                    }
                    None => Position::open(
                        plan.user_id.clone(),
                        &plan.instrument,
                        quote.quantity,
                        quote.price_usd,
                    )?,
                };
                (position, false)
            }
            TradeType::Sell => {
                let mut position = match existing {
                    Some(position) if position.quantity >= quote.quantity => position,
                    other => {
                        return Err(SettlementError::InsufficientHoldings {
                            needed: quote.quantity,
                            available: other.map(|p| p.quantity).unwrap_or_default(),
                        })
                    }
                };

                let outcome = position.apply_sell(quote.quantity, quote.price_usd)?;
                account.credit(plan.asset, quote.settlement_amount)?;
                transaction.metadata = serde_json::json!({
                    "realizedPnl": outcome.realized_pnl.to_string(),
                    "costBasis": outcome.cost_basis.to_string(),
                });
                (position, outcome.closed)
            }
        };

        transaction.complete();
        let earning = CommissionEarning::new(
            transaction.id.clone(),
            quote.commission_amount,
            plan.asset,
            plan.commission_rate,
        );

        insert_transaction(&db_tx, &transaction)?;
        insert_commission(&db_tx, &earning)?;
        write_account(&db_tx, &account)?;
        if closed {
            delete_position(&db_tx, &plan.user_id, &plan.instrument.id)?;
        } else {
            write_position(&db_tx, &position)?;
        }

        db_tx.commit()?;
        debug!(
            "Settled {} {} {} for {} ({} {})",
            plan.trade_type,
            quote.quantity,
            plan.instrument.symbol,
            plan.user_id,
            quote.settlement_amount,
            plan.asset
        );
        Ok(transaction)
    }

    /// Credit a confirmed wallet payment. A reference is applied at most once.
    pub fn apply_deposit(
        &self,
        user_id: &str,
        asset: SettlementAsset,
        amount: Decimal,
        reference: &str,
    ) -> Result<Transaction, SettlementError> {
        let mut conn = self.conn();
        let db_tx = conn.transaction()?;

        if reference_exists(&db_tx, reference)? {
            return Err(SettlementError::DuplicateReference(reference.to_string()));
        }

        let mut account = read_account(&db_tx, user_id)?
            .ok_or_else(|| SettlementError::AccountNotFound(user_id.to_string()))?;
        account.record_deposit(asset, amount)?;

        let mut transaction =
            Transaction::new(user_id.to_string(), TransactionType::Deposit, asset, amount);
        transaction.external_reference = Some(reference.to_string());
        transaction.complete();

        insert_transaction(&db_tx, &transaction)?;
        write_account(&db_tx, &account)?;
        db_tx.commit()?;

        info!("Deposited {} {} for {}", amount, asset, user_id);
        Ok(transaction)
    }

    /// Debit a withdrawal if the balance covers it.
    pub fn apply_withdrawal(
        &self,
        user_id: &str,
        asset: SettlementAsset,
        amount: Decimal,
    ) -> Result<Transaction, SettlementError> {
        let mut conn = self.conn();
        let db_tx = conn.transaction()?;

        let mut account = read_account(&db_tx, user_id)?
            .ok_or_else(|| SettlementError::AccountNotFound(user_id.to_string()))?;
        let available = account.balance(asset);
        if !account.record_withdrawal(asset, amount)? {
            return Err(SettlementError::InsufficientBalance {
                needed: amount,
                available,
            });
        }

        let mut transaction =
            Transaction::new(user_id.to_string(), TransactionType::Withdrawal, asset, amount);
        transaction.complete();

        insert_transaction(&db_tx, &transaction)?;
        write_account(&db_tx, &account)?;
        db_tx.commit()?;

        info!("Withdrew {} {} for {}", amount, asset, user_id);
        Ok(transaction)
    }
}

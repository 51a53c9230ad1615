//! Ledger Types
//!
//! Accounts, positions, transactions and commission earnings. All amounts are
//! fixed-point decimals; the position arithmetic here is the weighted-average
//! cost model the settlement pipeline relies on.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use super::instrument::{Instrument, PriceSnapshot};

// =============================================================================
// Enums
// =============================================================================

/// Asset used to pay for a trade or receive its proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementAsset {
    /// USD-pegged stablecoin
    Usdc,
    /// Native wallet token, converted at the current USD rate
    Wld,
}

impl SettlementAsset {
    pub fn is_usd_pegged(&self) -> bool {
        matches!(self, SettlementAsset::Usdc)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementAsset::Usdc => "USDC",
            SettlementAsset::Wld => "WLD",
        }
    }
}

impl std::fmt::Display for SettlementAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SettlementAsset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USDC" => Ok(SettlementAsset::Usdc),
            "WLD" => Ok(SettlementAsset::Wld),
            other => Err(format!("unknown settlement asset: {}", other)),
        }
    }
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Buy,
    Sell,
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "buy",
            TransactionType::Sell => "sell",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(TransactionType::Buy),
            "sell" => Ok(TransactionType::Sell),
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    /// Reserved; nothing cancels transactions yet
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// A ledger amount left the representable decimal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ledger amount out of range")]
pub struct LedgerOverflow;

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, LedgerOverflow> {
    a.checked_add(b).ok_or(LedgerOverflow)
}

fn checked_sub(a: Decimal, b: Decimal) -> Result<Decimal, LedgerOverflow> {
    a.checked_sub(b).ok_or(LedgerOverflow)
}

fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, LedgerOverflow> {
    a.checked_mul(b).ok_or(LedgerOverflow)
}

// =============================================================================
// Account
// =============================================================================

/// Balances granted to a newly created account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartingBalances {
    pub usdc: Decimal,
    pub wld: Decimal,
}

/// A user's settlement-asset balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub user_id: String,
    pub usdc_balance: Decimal,
    pub wld_balance: Decimal,
    pub total_deposited_usdc: Decimal,
    pub total_deposited_wld: Decimal,
    pub total_withdrawn_usdc: Decimal,
    pub total_withdrawn_wld: Decimal,
    /// When the account was created (ms)
    pub created_at: i64,
    /// When balances last changed (ms)
    pub updated_at: i64,
}

impl Account {
    /// Create an account funded with the given starting balances.
    ///
    /// Starting balances count as deposits so lifetime counters stay
    /// consistent with the balances.
    pub fn new(user_id: String, starting: StartingBalances) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            user_id,
            usdc_balance: starting.usdc,
            wld_balance: starting.wld,
            total_deposited_usdc: starting.usdc,
            total_deposited_wld: starting.wld,
            total_withdrawn_usdc: Decimal::ZERO,
            total_withdrawn_wld: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current balance in an asset.
    pub fn balance(&self, asset: SettlementAsset) -> Decimal {
        match asset {
            SettlementAsset::Usdc => self.usdc_balance,
            SettlementAsset::Wld => self.wld_balance,
        }
    }

    fn balance_mut(&mut self, asset: SettlementAsset) -> &mut Decimal {
        match asset {
            SettlementAsset::Usdc => &mut self.usdc_balance,
            SettlementAsset::Wld => &mut self.wld_balance,
        }
    }

    /// Add to a balance. On overflow the account is left untouched.
    pub fn credit(&mut self, asset: SettlementAsset, amount: Decimal) -> Result<(), LedgerOverflow> {
        let balance = self.balance_mut(asset);
        *balance = checked_add(*balance, amount)?;
        self.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(())
    }

    /// Subtract from a balance. Returns false and leaves the account untouched
    /// if the balance does not cover the amount.
    pub fn debit(&mut self, asset: SettlementAsset, amount: Decimal) -> bool {
        let balance = self.balance_mut(asset);
        if *balance < amount {
            return false;
        }
        *balance -= amount;
        self.updated_at = chrono::Utc::now().timestamp_millis();
        true
    }

    /// Credit a confirmed deposit and bump the lifetime counter.
    pub fn record_deposit(&mut self, asset: SettlementAsset, amount: Decimal) -> Result<(), LedgerOverflow> {
        let total = match asset {
            SettlementAsset::Usdc => checked_add(self.total_deposited_usdc, amount)?,
            SettlementAsset::Wld => checked_add(self.total_deposited_wld, amount)?,
        };
        self.credit(asset, amount)?;
        match asset {
            SettlementAsset::Usdc => self.total_deposited_usdc = total,
            SettlementAsset::Wld => self.total_deposited_wld = total,
        }
        Ok(())
    }

    /// Debit a withdrawal and bump the lifetime counter. `Ok(false)` means the
    /// balance did not cover the amount.
    pub fn record_withdrawal(&mut self, asset: SettlementAsset, amount: Decimal) -> Result<bool, LedgerOverflow> {
        let total = match asset {
            SettlementAsset::Usdc => checked_add(self.total_withdrawn_usdc, amount)?,
            SettlementAsset::Wld => checked_add(self.total_withdrawn_wld, amount)?,
        };
        if !self.debit(asset, amount) {
            return Ok(false);
        }
        match asset {
            SettlementAsset::Usdc => self.total_withdrawn_usdc = total,
            SettlementAsset::Wld => self.total_withdrawn_wld = total,
        }
        Ok(true)
    }
}

// =============================================================================
// Position
// =============================================================================

/// Holdings of one instrument, tracked at weighted-average cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub user_id: String,
    pub instrument_id: String,
    pub symbol: String,
    /// Units held; always positive while the row exists
    pub quantity: Decimal,
    /// Cost basis per unit
    pub average_buy_price: Decimal,
    /// Cost basis of the units held
    pub total_invested: Decimal,
    /// Profit or loss locked in by sells
    pub realized_pnl: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Result of selling from a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellOutcome {
    /// Cost basis of the units sold
    pub cost_basis: Decimal,
    /// Proceeds minus cost basis
    pub realized_pnl: Decimal,
    /// Whether the sell emptied the position
    pub closed: bool,
}

impl Position {
    /// Open a position from a first buy.
    pub fn open(
        user_id: String,
        instrument: &Instrument,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Self, LedgerOverflow> {
        let now = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            instrument_id: instrument.id.clone(),
            symbol: instrument.symbol.clone(),
            quantity,
            average_buy_price: price,
            total_invested: checked_mul(quantity, price)?,
            realized_pnl: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        })
    }

    /// Add a buy and recompute the average price. On overflow the position
    /// is left untouched.
    pub fn apply_buy(&mut self, quantity: Decimal, price: Decimal) -> Result<(), LedgerOverflow> {
        let new_quantity = checked_add(self.quantity, quantity)?;
        let new_invested = checked_add(self.total_invested, checked_mul(quantity, price)?)?;
        let average = new_invested.checked_div(new_quantity).ok_or(LedgerOverflow)?;

        self.quantity = new_quantity;
        self.total_invested = new_invested;
        self.average_buy_price = average;
        self.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(())
    }

    /// Remove sold units. The average price of the remainder is unchanged.
    ///
    /// Callers must check `quantity <= self.quantity` first.
    pub fn apply_sell(&mut self, quantity: Decimal, price: Decimal) -> Result<SellOutcome, LedgerOverflow> {
        let cost_basis = checked_mul(quantity, self.average_buy_price)?;
        let realized_pnl = checked_sub(checked_mul(quantity, price)?, cost_basis)?;
        let new_quantity = checked_sub(self.quantity, quantity)?;
        let new_invested = checked_sub(self.total_invested, cost_basis)?;
        let new_realized = checked_add(self.realized_pnl, realized_pnl)?;

        self.quantity = new_quantity;
        self.total_invested = new_invested;
        self.realized_pnl = new_realized;
        self.updated_at = chrono::Utc::now().timestamp_millis();

        Ok(SellOutcome {
            cost_basis,
            realized_pnl,
            closed: self.quantity.is_zero(),
        })
    }
}

/// A position valued at the current snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    #[serde(flatten)]
    pub position: Position,
    pub name: String,
    pub index_family: super::IndexFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl_pct: Option<Decimal>,
}

impl Holding {
    /// Value a position. Without a tradable snapshot the valuation fields are empty.
    pub fn value(position: Position, instrument: &Instrument, snapshot: Option<&PriceSnapshot>) -> Self {
        let price = snapshot.filter(|s| s.is_tradable()).map(|s| s.price_usd);
        let current_value = price.and_then(|p| p.checked_mul(position.quantity));
        let unrealized_pnl = current_value.and_then(|v| v.checked_sub(position.total_invested));
        let unrealized_pnl_pct = unrealized_pnl.and_then(|pnl| {
            if position.total_invested.is_zero() {
                None
            } else {
                pnl.checked_div(position.total_invested)
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                    .map(|pct| pct.round_dp(2))
            }
        });

        Self {
            name: instrument.name.clone(),
            index_family: instrument.index_family,
            current_price: price,
            current_value,
            unrealized_pnl,
            unrealized_pnl_pct,
            position,
        }
    }
}

// =============================================================================
// Transaction & Commission
// =============================================================================

/// Immutable record of a ledger operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub transaction_type: TransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    /// USD price per unit at execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_unit: Option<Decimal>,
    /// Gross value in USD (deposits/withdrawals: amount in the asset)
    pub total_amount: Decimal,
    /// Commission in USD
    pub commission_amount: Decimal,
    /// Amount debited or credited in the settlement asset
    pub settlement_amount: Decimal,
    pub settlement_asset: SettlementAsset,
    pub status: TransactionStatus,
    /// Identity proof presented for the trade
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_proof: Option<String>,
    /// External settlement reference (wallet payment id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Transaction {
    /// Create a pending transaction of the given type.
    pub fn new(
        user_id: String,
        transaction_type: TransactionType,
        settlement_asset: SettlementAsset,
        total_amount: Decimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            transaction_type,
            instrument_id: None,
            symbol: None,
            quantity: None,
            price_per_unit: None,
            total_amount,
            commission_amount: Decimal::ZERO,
            settlement_amount: total_amount,
            settlement_asset,
            status: TransactionStatus::Pending,
            identity_proof: None,
            external_reference: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn complete(&mut self) {
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn fail(&mut self, reason: &str) {
        self.status = TransactionStatus::Failed;
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        self.metadata = serde_json::json!({ "failureReason": reason });
    }
}

/// Fee earned on a completed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionEarning {
    pub id: String,
    pub transaction_id: String,
    /// Fee in units of `currency`
    pub amount: Decimal,
    pub currency: SettlementAsset,
    /// Rate applied to the gross value
    pub rate: Decimal,
    pub earned_at: i64,
}

impl CommissionEarning {
    pub fn new(transaction_id: String, amount: Decimal, currency: SettlementAsset, rate: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            amount,
            currency,
            rate,
            earned_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Commission totals for one currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionTotal {
    pub currency: SettlementAsset,
    pub total: Decimal,
    pub trades: u64,
}

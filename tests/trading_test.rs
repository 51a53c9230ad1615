//! Ledger properties of trade settlement.
//!
//! Tests cover:
//! - Conservation of value on buys and sells
//! - Weighted-average cost and realized P&L
//! - Clean rejections (balance, holdings, identity)
//! - Concurrent trades against one account
//! - WLD settlement, deposits and history ordering

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use trustsave::config::Config;
use trustsave::services::{AcceptAllPayments, SqliteStore, TradeError};
use trustsave::sources::{Quote, QuoteError, QuoteSource};
use trustsave::types::*;
use trustsave::AppState;

const ALICE: &str = "0xalice";
const PROOF: &str = "nullifier-alice";

struct NoQuotes;

#[async_trait]
impl QuoteSource for NoQuotes {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        Err(QuoteError::Api(format!("offline: {}", symbol)))
    }
}

fn create_test_state(usdc: Decimal, wld: Decimal) -> AppState {
    let mut config = Config::default();
    config.starting_balances = StartingBalances { usdc, wld };

    let sqlite = Arc::new(SqliteStore::new_in_memory().unwrap());
    let state = AppState::new(
        config,
        sqlite,
        Arc::new(NoQuotes),
        Arc::new(AcceptAllPayments),
        None,
    );
    state.prices.seed_catalog(&default_catalog()).unwrap();
    set_price(&state, "SPY", dec!(10));

    state
        .verification
        .record_proof(
            ALICE,
            &ProofSubmission {
                nullifier_hash: PROOF.to_string(),
                verification_level: VerificationLevel::Orb,
                attestation: None,
            },
        )
        .unwrap();
    state
}

fn set_price(state: &AppState, symbol: &str, price: Decimal) {
    let instrument = state.prices.instrument(symbol).unwrap().unwrap();
    state
        .prices
        .replace(PriceSnapshot::new(&instrument, price))
        .unwrap();
}

fn request(trade_type: TradeType, quantity: Decimal, asset: SettlementAsset) -> TradeRequest {
    TradeRequest {
        instrument_symbol: "SPY".to_string(),
        quantity,
        trade_type,
        settlement_asset: asset,
        identity_proof: Some(PROOF.to_string()),
        account_id: None,
    }
}

async fn trade(state: &AppState, trade_type: TradeType, quantity: Decimal) -> Result<TradeResult, TradeError> {
    state
        .engine
        .execute_trade(ALICE, &request(trade_type, quantity, SettlementAsset::Usdc))
        .await
}

fn spy_position(state: &AppState) -> Option<Position> {
    let instrument = state.prices.instrument("SPY").unwrap().unwrap();
    state.sqlite.get_position(ALICE, &instrument.id).unwrap()
}

fn balance(state: &AppState, asset: SettlementAsset) -> Decimal {
    state
        .accounts
        .get_or_create_account(ALICE)
        .unwrap()
        .balance(asset)
}

// =============================================================================
// Buys and sells
// =============================================================================

#[tokio::test]
async fn test_buy_conserves_value() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);

    let result = trade(&state, TradeType::Buy, dec!(2)).await.unwrap();
    assert_eq!(result.message, "Bought 2 SPY");
    assert_eq!(result.status, TransactionStatus::Completed);

    // 20 gross + 0.15 commission
    assert_eq!(balance(&state, SettlementAsset::Usdc), dec!(979.85));
    assert_eq!(result.transaction.settlement_amount, dec!(20.15));
    assert_eq!(result.transaction.commission_amount, dec!(0.15));

    let position = spy_position(&state).unwrap();
    assert_eq!(position.quantity, dec!(2));
    assert_eq!(position.average_buy_price, dec!(10));

    let summary = state.engine.commission_summary().unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].currency, SettlementAsset::Usdc);
    assert_eq!(summary[0].total, dec!(0.15));
    assert_eq!(summary[0].trades, 1);
}

#[tokio::test]
async fn test_weighted_average_cost() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);

    trade(&state, TradeType::Buy, dec!(2)).await.unwrap();
    set_price(&state, "SPY", dec!(20));
    trade(&state, TradeType::Buy, dec!(2)).await.unwrap();

    let position = spy_position(&state).unwrap();
    assert_eq!(position.quantity, dec!(4));
    assert_eq!(position.total_invested, dec!(60));
    assert_eq!(position.average_buy_price, dec!(15));
}

#[tokio::test]
async fn test_sell_keeps_remainder_cost_basis() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);

    trade(&state, TradeType::Buy, dec!(4)).await.unwrap();
    set_price(&state, "SPY", dec!(15));
    let result = trade(&state, TradeType::Sell, dec!(1)).await.unwrap();
    assert_eq!(result.message, "Sold 1 SPY");

    let position = spy_position(&state).unwrap();
    assert_eq!(position.quantity, dec!(3));
    assert_eq!(position.average_buy_price, dec!(10));
    assert_eq!(position.realized_pnl, dec!(5));

    let realized: Decimal = result.transaction.metadata["realizedPnl"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(realized, dec!(5));

    // -40.30 on the buy, +14.8875 on the sell
    assert_eq!(balance(&state, SettlementAsset::Usdc), dec!(974.5875));
}

#[tokio::test]
async fn test_full_liquidation_removes_position() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);

    trade(&state, TradeType::Buy, dec!(2)).await.unwrap();
    trade(&state, TradeType::Sell, dec!(2)).await.unwrap();

    assert!(spy_position(&state).is_none());
    assert!(state.accounts.holdings(ALICE).unwrap().is_empty());
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn test_insufficient_balance_changes_nothing() {
    let state = create_test_state(dec!(10), Decimal::ZERO);

    let err = trade(&state, TradeType::Buy, dec!(2)).await.unwrap_err();
    assert!(matches!(err, TradeError::InsufficientBalance { .. }));
    assert_eq!(err.code(), "INSUFFICIENT_BALANCE");

    assert_eq!(balance(&state, SettlementAsset::Usdc), dec!(10));
    assert!(spy_position(&state).is_none());
    assert!(state.accounts.transactions(ALICE, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_holdings_changes_nothing() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);
    trade(&state, TradeType::Buy, dec!(1)).await.unwrap();

    let err = trade(&state, TradeType::Sell, dec!(2)).await.unwrap_err();
    assert!(matches!(
        err,
        TradeError::InsufficientHoldings { needed, available } if needed == dec!(2) && available == dec!(1)
    ));
    assert_eq!(spy_position(&state).unwrap().quantity, dec!(1));
    assert_eq!(state.accounts.transactions(ALICE, None).unwrap().len(), 1);
}

#[tokio::test]
async fn test_unverified_and_foreign_account_rejected() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);

    let mut unverified = request(TradeType::Buy, dec!(1), SettlementAsset::Usdc);
    unverified.identity_proof = None;
    let err = state.engine.execute_trade(ALICE, &unverified).await.unwrap_err();
    assert!(matches!(err, TradeError::Unverified));

    // Alice's proof does not verify Bob
    let err = state
        .engine
        .execute_trade("0xbob", &request(TradeType::Buy, dec!(1), SettlementAsset::Usdc))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::Unverified));

    let mut foreign = request(TradeType::Buy, dec!(1), SettlementAsset::Usdc);
    foreign.account_id = Some("0xbob".to_string());
    let err = state.engine.execute_trade(ALICE, &foreign).await.unwrap_err();
    assert!(matches!(err, TradeError::Unauthorized(_)));

    assert!(state.accounts.transactions(ALICE, None).unwrap().is_empty());
}

#[tokio::test]
async fn test_unpriced_instrument_rejected() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);

    let mut dax = request(TradeType::Buy, dec!(1), SettlementAsset::Usdc);
    dax.instrument_symbol = "dax".to_string();
    let err = state.engine.execute_trade(ALICE, &dax).await.unwrap_err();
    assert!(matches!(err, TradeError::PriceUnavailable(ref s) if s == "DAX"));

    let mut unknown = request(TradeType::Buy, dec!(1), SettlementAsset::Usdc);
    unknown.instrument_symbol = "NOPE".to_string();
    let err = state.engine.execute_trade(ALICE, &unknown).await.unwrap_err();
    assert!(matches!(err, TradeError::InstrumentUnavailable(_)));
}

// =============================================================================
// Prices and rates
// =============================================================================

#[tokio::test]
async fn test_price_replace_is_idempotent() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);
    let instrument = state.prices.instrument("SPY").unwrap().unwrap();
    let snapshot = PriceSnapshot::new(&instrument, dec!(12.5));

    state.prices.replace(snapshot.clone()).unwrap();
    state.prices.replace(snapshot.clone()).unwrap();

    assert_eq!(state.prices.get_price("SPY").unwrap(), snapshot);
    let stored = state.sqlite.list_price_snapshots().unwrap();
    assert_eq!(stored.iter().filter(|s| s.symbol == "SPY").count(), 1);
}

#[tokio::test]
async fn test_wld_settlement_converts_by_rate() {
    let state = create_test_state(Decimal::ZERO, dec!(100));

    let result = state
        .engine
        .execute_trade(ALICE, &request(TradeType::Buy, dec!(2), SettlementAsset::Wld))
        .await
        .unwrap();

    let expected = dec!(20.15) / dec!(2.45);
    assert_eq!(result.transaction.settlement_asset, SettlementAsset::Wld);
    assert_eq!(result.transaction.settlement_amount, expected);
    assert_eq!(balance(&state, SettlementAsset::Wld), dec!(100) - expected);
    assert_eq!(balance(&state, SettlementAsset::Usdc), Decimal::ZERO);

    let summary = state.engine.commission_summary().unwrap();
    assert_eq!(summary[0].currency, SettlementAsset::Wld);
    assert_eq!(summary[0].total, dec!(0.15) / dec!(2.45));

    // New rate applies to the next trade
    assert!(state.rates.set_rate(SettlementAsset::Wld, dec!(5)));
    let result = state
        .engine
        .execute_trade(ALICE, &request(TradeType::Sell, dec!(2), SettlementAsset::Wld))
        .await
        .unwrap();
    assert_eq!(result.transaction.settlement_amount, dec!(19.85) / dec!(5));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_buys_never_overdraw() {
    // Each buy costs 10.075; 100 covers nine of them
    let state = create_test_state(dec!(100), Decimal::ZERO);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            trade(&state, TradeType::Buy, dec!(1)).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(e) => assert!(matches!(e, TradeError::InsufficientBalance { .. })),
        }
    }

    assert_eq!(succeeded, 9);
    assert_eq!(balance(&state, SettlementAsset::Usdc), dec!(9.325));
    assert_eq!(spy_position(&state).unwrap().quantity, dec!(9));
    assert_eq!(state.accounts.transactions(ALICE, Some(100)).unwrap().len(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sells_never_oversell() {
    let state = create_test_state(dec!(1000), Decimal::ZERO);
    trade(&state, TradeType::Buy, dec!(5)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            trade(&state, TradeType::Sell, dec!(1)).await.is_ok()
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    assert!(spy_position(&state).is_none());
}

// =============================================================================
// Wallet and history
// =============================================================================

#[tokio::test]
async fn test_deposit_withdraw_and_history_order() {
    let state = create_test_state(Decimal::ZERO, Decimal::ZERO);

    state
        .accounts
        .deposit(ALICE, SettlementAsset::Usdc, dec!(50), "pay-1")
        .await
        .unwrap();
    let err = state
        .accounts
        .deposit(ALICE, SettlementAsset::Usdc, dec!(50), "pay-1")
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::PaymentFailed(_)));

    trade(&state, TradeType::Buy, dec!(1)).await.unwrap();

    let err = state
        .accounts
        .withdraw(ALICE, SettlementAsset::Usdc, dec!(100))
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::InsufficientBalance { .. }));

    state
        .accounts
        .withdraw(ALICE, SettlementAsset::Usdc, dec!(10))
        .await
        .unwrap();

    let history = state.accounts.transactions(ALICE, None).unwrap();
    let kinds: Vec<TransactionType> = history.iter().map(|t| t.transaction_type).collect();
    assert_eq!(
        kinds,
        vec![TransactionType::Withdrawal, TransactionType::Buy, TransactionType::Deposit]
    );
    // 50 - 10.075 - 10
    assert_eq!(balance(&state, SettlementAsset::Usdc), dec!(29.925));
}

#[tokio::test]
async fn test_deposit_beyond_range_is_rejected() {
    let state = create_test_state(Decimal::ZERO, Decimal::ZERO);

    state
        .accounts
        .deposit(ALICE, SettlementAsset::Usdc, Decimal::MAX, "pay-1")
        .await
        .unwrap();
    let err = state
        .accounts
        .deposit(ALICE, SettlementAsset::Usdc, Decimal::MAX, "pay-2")
        .await
        .unwrap_err();

    assert!(matches!(err, TradeError::InvalidAmount(_)));
    assert_eq!(balance(&state, SettlementAsset::Usdc), Decimal::MAX);
    assert_eq!(state.accounts.transactions(ALICE, None).unwrap().len(), 1);

    // The account still settles normally afterwards
    state
        .accounts
        .withdraw(ALICE, SettlementAsset::Usdc, dec!(1))
        .await
        .unwrap();
}

//! TrustSave - index token investment server for a wallet mini-app.
//!
//! Users buy and sell tokens tracking stock index families, settling in USDC
//! or WLD against an internal ledger.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

use axum::Router;
use config::Config;
use services::{
    AccountService, AuthService, EngineConfig, IngestionConfig, PaymentVerifier, PriceBook,
    PriceIngestor, RateBook, SqliteStore, TradeEngine, UserLocks, VerificationRegistry,
};
use sources::QuoteSource;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sqlite: Arc<SqliteStore>,
    pub auth: AuthService,
    pub verification: VerificationRegistry,
    pub prices: PriceBook,
    pub rates: RateBook,
    pub engine: TradeEngine,
    pub accounts: AccountService,
    pub ingestor: Arc<PriceIngestor>,
}

impl AppState {
    /// Wire every service from configuration and the external collaborators.
    pub fn new(
        config: Config,
        sqlite: Arc<SqliteStore>,
        quotes: Arc<dyn QuoteSource>,
        payments: Arc<dyn PaymentVerifier>,
        redis: Option<redis::aio::ConnectionManager>,
    ) -> Self {
        let config = Arc::new(config);
        let timeout = config.external_timeout();
        // Trades, deposits and withdrawals share one lock table
        let locks = UserLocks::new();

        let auth = AuthService::new(
            redis,
            config.auth_secret.clone(),
            config.environment,
            config.session_ttl_hours,
        );
        let verification = VerificationRegistry::new(
            sqlite.clone(),
            config.verification_secret.clone(),
            config.environment,
        );
        let prices = PriceBook::new(sqlite.clone());
        let rates = RateBook::new(config.wld_usd_rate);

        let engine = TradeEngine::new(
            sqlite.clone(),
            prices.clone(),
            Arc::new(rates.clone()),
            Arc::new(verification.clone()),
            locks.clone(),
            EngineConfig {
                commission_rate: config.commission_rate,
                starting_balances: config.starting_balances,
                external_timeout: timeout,
            },
        );
        let accounts = AccountService::new(
            sqlite.clone(),
            prices.clone(),
            payments,
            locks,
            config.starting_balances,
            timeout,
        );
        let ingestor = Arc::new(PriceIngestor::new(
            prices.clone(),
            rates.clone(),
            quotes,
            IngestionConfig {
                scale_factor: config.price_scale_factor,
                refresh_wld_rate: config.refresh_wld_rate,
                timeout,
            },
        ));

        Self {
            config,
            sqlite,
            auth,
            verification,
            prices,
            rates,
            engine,
            accounts,
            ingestor,
        }
    }
}

/// Build the HTTP application.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trustsave::config::Config;
use trustsave::services::{AcceptAllPayments, HttpPaymentVerifier, PaymentVerifier, SqliteStore};
use trustsave::sources::YahooQuoteSource;
use trustsave::types::default_catalog;
use trustsave::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trustsave=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!(
        "Starting TrustSave server on {}:{} ({})",
        config.host, config.port, config.environment
    );

    // Open the ledger
    let sqlite = Arc::new(SqliteStore::new(&config.database_path)?);
    info!("Ledger opened at {}", config.database_path);

    // Wallet payment confirmation
    let payments: Arc<dyn PaymentVerifier> = match config.payment_api_url.as_deref() {
        Some(url) => {
            info!("Confirming deposits against {}", url);
            Arc::new(HttpPaymentVerifier::new(
                url,
                config.payment_api_key.clone(),
                config.external_timeout(),
            )?)
        }
        None if config.environment.is_development() => {
            warn!("PAYMENT_API_URL not set, accepting all deposits (development)");
            Arc::new(AcceptAllPayments)
        }
        None => anyhow::bail!("PAYMENT_API_URL is required in production"),
    };

    // Connect to Redis for session persistence
    let redis = match config.redis_url.as_deref() {
        Some(url) => match connect_redis(url).await {
            Ok(manager) => {
                info!("Connected to Redis for session persistence");
                Some(manager)
            }
            Err(e) => {
                warn!("Redis unavailable, sessions are in-memory only: {}", e);
                None
            }
        },
        None => None,
    };

    let quotes = Arc::new(YahooQuoteSource::new(config.external_timeout())?);
    let seed_instruments = config.seed_instruments;
    let refresh_secs = config.price_refresh_secs;
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState::new(config, sqlite, quotes, payments, redis);

    // Catalog and cached prices
    if seed_instruments {
        let added = state.prices.seed_catalog(&default_catalog())?;
        if added > 0 {
            info!("Listed {} new instruments", added);
        }
    }
    let loaded = state.prices.load()?;
    info!("Loaded {} price snapshots", loaded);

    // Periodic price ingestion
    if refresh_secs > 0 {
        state
            .ingestor
            .clone()
            .spawn_periodic(Duration::from_secs(refresh_secs));
    }

    let app = trustsave::app(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("TrustSave server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect_redis(url: &str) -> redis::RedisResult<redis::aio::ConnectionManager> {
    let client = redis::Client::open(url)?;
    redis::aio::ConnectionManager::new(client).await
}

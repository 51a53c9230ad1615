//! HTTP round trips through the full router.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use trustsave::config::Config;
use trustsave::services::{AcceptAllPayments, SqliteStore};
use trustsave::sources::{Quote, QuoteError, QuoteSource};
use trustsave::types::{default_catalog, PriceSnapshot};
use trustsave::AppState;

struct FlatQuotes;

#[async_trait]
impl QuoteSource for FlatQuotes {
    fn name(&self) -> &'static str {
        "flat"
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, QuoteError> {
        Ok(Quote {
            symbol: symbol.to_string(),
            regular_market_price: dec!(5000),
            previous_close: Some(dec!(4950)),
            volume: None,
        })
    }
}

fn create_test_app(config: Config) -> Router {
    let sqlite = Arc::new(SqliteStore::new_in_memory().unwrap());
    let state = AppState::new(
        config,
        sqlite,
        Arc::new(FlatQuotes),
        Arc::new(AcceptAllPayments),
        None,
    );
    state.prices.seed_catalog(&default_catalog()).unwrap();
    let spy = state.prices.instrument("SPY").unwrap().unwrap();
    state
        .prices
        .replace(PriceSnapshot::new(&spy, dec!(10)))
        .unwrap();
    trustsave::app(state)
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn demo_session(app: &Router) -> String {
    let (status, body) = send(app, "POST", "/api/auth/demo", None, None).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["sessionToken"].as_str().unwrap().to_string()
}

async fn verify_caller(app: &Router, token: &str) {
    let (status, _) = send(
        app,
        "POST",
        "/api/verification/proofs",
        Some(token),
        Some(json!({ "nullifierHash": format!("null-{}", token), "verificationLevel": "orb" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app(Config::default());
    let (status, body) = send(&app, "GET", "/api/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["environment"], "development");
}

#[tokio::test]
async fn test_wallet_login_flow() {
    let app = create_test_app(Config::default());

    let (status, body) = send(&app, "GET", "/api/auth/challenge", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let challenge = body["data"]["challenge"].as_str().unwrap().to_string();

    let address = format!("0x{}", "ab".repeat(20));
    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/verify",
        None,
        Some(json!({ "address": address, "challenge": challenge, "signature": "cd".repeat(32) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userId"], address);
    let token = body["data"]["sessionToken"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", "/api/account", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userId"], address);

    let (status, _) = send(&app, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/api/account", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_requires_session() {
    let app = create_test_app(Config::default());

    let (status, _) = send(&app, "GET", "/api/account", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/trading/positions", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_trade_round_trip() {
    let app = create_test_app(Config::default());
    let token = demo_session(&app).await;
    verify_caller(&app, &token).await;

    let trade = json!({
        "instrumentSymbol": "spy",
        "quantity": "2",
        "tradeType": "buy",
        "settlementAsset": "USDC",
        "identityProof": format!("null-{}", token),
    });
    let (status, body) = send(&app, "POST", "/api/trading/trades", Some(&token), Some(trade)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Bought 2 SPY");
    assert_eq!(body["transaction"]["status"], "completed");

    let (status, body) = send(&app, "GET", "/api/trading/positions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["symbol"], "SPY");

    let (status, body) = send(&app, "GET", "/api/trading/transactions?limit=5", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_trade_rejections() {
    let app = create_test_app(Config::default());
    let token = demo_session(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/trading/trades",
        Some(&token),
        Some(json!({ "instrumentSymbol": "SPY", "quantity": "lots" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_AMOUNT");

    let trade = json!({
        "instrumentSymbol": "SPY",
        "quantity": "1",
        "tradeType": "buy",
        "settlementAsset": "USDC",
    });
    let (status, body) = send(&app, "POST", "/api/trading/trades", Some(&token), Some(trade)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNVERIFIED");
}

#[tokio::test]
async fn test_market_catalog() {
    let app = create_test_app(Config::default());

    let (status, body) = send(&app, "GET", "/api/market/instruments", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), default_catalog().len());

    let (status, body) = send(&app, "GET", "/api/market/instruments/SPY", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["price"]["priceUsd"], "10");

    let (status, body) = send(&app, "GET", "/api/market/instruments/NOPE", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_operator_endpoints() {
    let disabled = create_test_app(Config::default());
    let (status, _) = send(&disabled, "GET", "/api/admin/commissions", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut config = Config::default();
    config.admin_api_key = Some("operator".to_string());
    let app = create_test_app(config);

    let request = Request::builder()
        .uri("/api/admin/commissions")
        .header("X-Admin-Key", "wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("POST")
        .uri("/api/market/refresh")
        .header("X-Admin-Key", "operator")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["updated"].as_array().unwrap().len(), default_catalog().len());

    let (status, body) = send(&app, "GET", "/api/market/instruments/SPY", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["price"]["priceUsd"], "50");
}

#[tokio::test]
async fn test_delisting_blocks_trades() {
    let mut config = Config::default();
    config.admin_api_key = Some("operator".to_string());
    let app = create_test_app(config);
    let token = demo_session(&app).await;
    verify_caller(&app, &token).await;

    let request = Request::builder()
        .method("PUT")
        .uri("/api/admin/instruments/spy")
        .header("X-Admin-Key", "operator")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "active": false }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let trade = json!({
        "instrumentSymbol": "SPY",
        "quantity": "1",
        "tradeType": "buy",
        "settlementAsset": "USDC",
        "identityProof": format!("null-{}", token),
    });
    let (status, body) = send(&app, "POST", "/api/trading/trades", Some(&token), Some(trade)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "INSTRUMENT_UNAVAILABLE");

    let (_, body) = send(&app, "GET", "/api/market/instruments", None, None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), default_catalog().len() - 1);
}

#[tokio::test]
async fn test_transaction_detail() {
    let app = create_test_app(Config::default());
    let token = demo_session(&app).await;
    verify_caller(&app, &token).await;

    let trade = json!({
        "instrumentSymbol": "SPY",
        "quantity": "1",
        "tradeType": "buy",
        "settlementAsset": "USDC",
        "identityProof": format!("null-{}", token),
    });
    let (_, body) = send(&app, "POST", "/api/trading/trades", Some(&token), Some(trade)).await;
    let id = body["transaction"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/trading/transactions/{}", id);
    let (status, body) = send(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());
    assert_eq!(body["data"]["commission"]["currency"], "USDC");

    let other = demo_session(&app).await;
    let (status, _) = send(&app, "GET", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

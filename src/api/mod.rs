pub mod account;
pub mod admin;
pub mod auth;
pub mod health;
pub mod market;
pub mod trading;
pub mod verification;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/auth", auth::router())
        .nest("/api/verification", verification::router())
        .nest("/api/market", market::router())
        .nest("/api/account", account::router())
        .nest("/api/trading", trading::router())
        .nest("/api/admin", admin::router())
}

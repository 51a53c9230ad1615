/**
 * Authentication API
 *
 * Flow:
 * 1. GET /api/auth/challenge - Get a challenge to sign
 * 2. POST /api/auth/verify - Submit signed challenge to authenticate
 * 3. POST /api/auth/demo - Sandbox session (development only)
 * 4. POST /api/auth/logout - Logout and invalidate session
 *
 * Authenticated endpoints expect `Authorization: Bearer <sessionToken>`.
 */

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::ApiResponse;
use crate::services::AuthError;
use crate::types::{AuthChallenge, AuthRequest, AuthResponse, AuthenticatedUser, Session};
use crate::AppState;

/// Create auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/challenge", get(get_challenge))
        .route("/verify", post(verify))
        .route("/demo", post(demo))
        .route("/logout", post(logout))
}

/// GET /api/auth/challenge
///
/// Get a challenge string to sign for authentication.
async fn get_challenge(State(state): State<AppState>) -> Json<ApiResponse<AuthChallenge>> {
    Json(ApiResponse::new(state.auth.create_challenge()))
}

/// POST /api/auth/verify
///
/// Verify a signed challenge and create a session.
async fn verify(
    State(state): State<AppState>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AuthError> {
    let session = state.auth.verify(&request).await?;
    Ok(Json(ApiResponse::new(session_response(session))))
}

/// POST /api/auth/demo
async fn demo(State(state): State<AppState>) -> Result<Json<ApiResponse<AuthResponse>>, AuthError> {
    let session = state.auth.create_demo_session().await?;
    Ok(Json(ApiResponse::new(session_response(session))))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Json<ApiResponse<LogoutResponse>> {
    state.auth.logout(&auth.user.session_token).await;
    Json(ApiResponse::new(LogoutResponse { success: true }))
}

fn session_response(session: Session) -> AuthResponse {
    AuthResponse {
        authenticated: true,
        user_id: session.user_id,
        session_token: session.token,
        expires_at: session.expires_at,
        demo: session.demo,
    }
}

/// Authenticated user extractor.
///
/// Use this in route handlers to require authentication:
/// ```ignore
/// async fn my_handler(auth: Authenticated) -> impl IntoResponse {
///     let user_id = auth.user.user_id;
///     // ...
/// }
/// ```
pub struct Authenticated {
    pub user: AuthenticatedUser,
}

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::Unauthorized)?;

        let session = state
            .auth
            .validate_session(token)
            .await
            .ok_or(AuthError::SessionNotFound)?;

        Ok(Authenticated {
            user: AuthenticatedUser {
                user_id: session.user_id,
                session_token: session.token,
                demo: session.demo,
            },
        })
    }
}

/// Logout response.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/**
 * Authentication Service
 *
 * Wallet sign-in and session management.
 *
 * The client signs a server-issued challenge; the signature is an
 * HMAC-SHA256 over "{challenge}:{address}" keyed with AUTH_SECRET.
 * Without a secret, well-formed signatures are accepted in development only.
 *
 * Storage:
 * - DashMap: challenges and sessions
 * - Redis (optional): sessions, so they survive restarts
 */

use crate::config::Environment;
use crate::types::{AuthChallenge, AuthRequest, Session};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

const SESSION_KEY_PREFIX: &str = "trustsave:session:";

/// Authentication service for managing challenges and sessions.
#[derive(Clone)]
pub struct AuthService {
    /// Active challenges (challenge_string -> AuthChallenge)
    challenges: Arc<DashMap<String, AuthChallenge>>,
    /// Active sessions (session_token -> Session)
    sessions: Arc<DashMap<String, Session>>,
    /// Optional Redis connection for session persistence
    redis: Option<redis::aio::ConnectionManager>,
    secret: Option<String>,
    environment: Environment,
    ttl_hours: i64,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(
        redis: Option<redis::aio::ConnectionManager>,
        secret: Option<String>,
        environment: Environment,
        ttl_hours: i64,
    ) -> Self {
        Self {
            challenges: Arc::new(DashMap::new()),
            sessions: Arc::new(DashMap::new()),
            redis,
            secret,
            environment,
            ttl_hours,
        }
    }

    /// Generate a new authentication challenge.
    pub fn create_challenge(&self) -> AuthChallenge {
        // Drop challenges nobody came back for
        self.challenges.retain(|_, c| !c.is_expired());

        let challenge = AuthChallenge::new();
        self.challenges
            .insert(challenge.challenge.clone(), challenge.clone());
        debug!("Created auth challenge: {}", &challenge.challenge[..16]);
        challenge
    }

    /// Verify a signed challenge and open a session for the wallet.
    pub async fn verify(&self, request: &AuthRequest) -> Result<Session, AuthError> {
        // 1. Challenge must exist and be fresh; it is consumed either way
        let challenge = self
            .challenges
            .remove(&request.challenge)
            .map(|(_, c)| c)
            .ok_or(AuthError::InvalidChallenge)?;

        if challenge.is_expired() {
            warn!("Expired challenge used by {}", short(&request.address));
            return Err(AuthError::ExpiredChallenge);
        }

        // 2. Check the signature
        let address = normalize_address(&request.address)?;
        self.verify_signature(&address, &request.challenge, &request.signature)?;

        info!("Authenticated wallet {}", short(&address));

        // 3. Open the session
        Ok(self.open_session(address, false).await)
    }

    /// Open a sandbox session without a wallet. Development only.
    pub async fn create_demo_session(&self) -> Result<Session, AuthError> {
        if !self.environment.is_development() {
            warn!("Demo session requested in {}", self.environment);
            return Err(AuthError::DemoDisabled);
        }

        let user_id = format!("demo-{}", uuid::Uuid::new_v4().simple());
        info!("Created demo session for {}", user_id);
        Ok(self.open_session(user_id, true).await)
    }

    fn verify_signature(&self, address: &str, challenge: &str, signature: &str) -> Result<(), AuthError> {
        let sig_hex = signature.strip_prefix("0x").unwrap_or(signature);
        let signature_bytes =
            hex::decode(sig_hex).map_err(|_| AuthError::InvalidSignatureFormat)?;

        // HMAC-SHA256 output
        if signature_bytes.len() != 32 {
            return Err(AuthError::InvalidSignatureFormat);
        }

        let Some(secret) = self.secret.as_deref() else {
            if self.environment.is_development() {
                debug!("Accepting unkeyed signature for {} (development)", short(address));
                return Ok(());
            }
            return Err(AuthError::NotConfigured);
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AuthError::NotConfigured)?;
        mac.update(format!("{}:{}", challenge, address).as_bytes());
        mac.verify_slice(&signature_bytes).map_err(|_| {
            warn!("Invalid signature from {}", short(address));
            AuthError::InvalidSignature
        })
    }

    async fn open_session(&self, user_id: String, demo: bool) -> Session {
        let session = Session::new(user_id, self.ttl_hours, demo);
        self.sessions.insert(session.token.clone(), session.clone());

        if let Some(ref redis) = self.redis {
            self.persist_session(&session, redis.clone()).await;
        }

        session
    }

    /// Validate a session token.
    pub async fn validate_session(&self, token: &str) -> Option<Session> {
        // Note: clone and drop the ref before removing to avoid deadlocks
        let cached = self.sessions.get(token).map(|s| s.clone());

        if let Some(session) = cached {
            if session.is_expired() {
                self.sessions.remove(token);
                return None;
            }
            return Some(session);
        }

        if let Some(ref redis) = self.redis {
            if let Ok(session) = self.load_session_from_redis(token, redis.clone()).await {
                if !session.is_expired() {
                    self.sessions.insert(token.to_string(), session.clone());
                    return Some(session);
                }
            }
        }

        None
    }

    /// Logout - invalidate session.
    pub async fn logout(&self, token: &str) {
        self.sessions.remove(token);

        if let Some(ref redis) = self.redis {
            let mut conn = redis.clone();
            let key = format!("{}{}", SESSION_KEY_PREFIX, token);
            let _: Result<(), _> = redis::cmd("DEL").arg(&key).query_async(&mut conn).await;
        }
    }

    // Redis persistence helpers

    async fn persist_session(&self, session: &Session, mut redis: redis::aio::ConnectionManager) {
        let key = format!("{}{}", SESSION_KEY_PREFIX, session.token);
        let value = match serde_json::to_string(session) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to encode session: {}", e);
                return;
            }
        };

        let result: Result<(), _> = redis::cmd("SETEX")
            .arg(&key)
            .arg(session.ttl_seconds())
            .arg(&value)
            .query_async(&mut redis)
            .await;
        if let Err(e) = result {
            warn!("Failed to persist session to Redis: {}", e);
        }
    }

    async fn load_session_from_redis(
        &self,
        token: &str,
        mut redis: redis::aio::ConnectionManager,
    ) -> Result<Session, AuthError> {
        let key = format!("{}{}", SESSION_KEY_PREFIX, token);
        let value: String = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut redis)
            .await
            .map_err(|_| AuthError::SessionNotFound)?;

        serde_json::from_str(&value).map_err(|_| AuthError::SessionNotFound)
    }
}

/// Lowercased 0x-prefixed 20-byte address.
fn normalize_address(address: &str) -> Result<String, AuthError> {
    let trimmed = address.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_part.len() != 40 || hex::decode(hex_part).is_err() {
        return Err(AuthError::InvalidAddressFormat);
    }
    Ok(format!("0x{}", hex_part.to_lowercase()))
}

fn short(value: &str) -> &str {
    value.get(..10).unwrap_or(value)
}

/// Sign a login challenge the way the wallet client does.
pub fn sign_challenge(secret: &str, challenge: &str, address: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{}:{}", challenge, address).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid challenge")]
    InvalidChallenge,

    #[error("Challenge expired")]
    ExpiredChallenge,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    #[error("Invalid address format")]
    InvalidAddressFormat,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Demo sessions are disabled")]
    DemoDisabled,

    #[error("Authentication is not configured")]
    NotConfigured,

    #[error("Unauthorized")]
    Unauthorized,
}

impl axum::response::IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            AuthError::InvalidChallenge
            | AuthError::ExpiredChallenge
            | AuthError::InvalidSignatureFormat
            | AuthError::InvalidAddressFormat => StatusCode::BAD_REQUEST,
            AuthError::InvalidSignature
            | AuthError::SessionNotFound
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::DemoDisabled => StatusCode::FORBIDDEN,
            AuthError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

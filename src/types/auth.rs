//! Authentication Types
//!
//! Types for wallet sign-in. The wallet signs a server-issued challenge and
//! the signed challenge is exchanged for a session token.

use serde::{Deserialize, Serialize};

/// Challenge issued to clients for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// Random challenge string to sign
    pub challenge: String,
    /// Timestamp when challenge was issued (ms)
    pub timestamp: i64,
    /// Expiration timestamp (ms) - challenges expire after 5 minutes
    pub expires_at: i64,
}

/// Authentication request from client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    /// Wallet address (0x-prefixed hex)
    pub address: String,
    /// The challenge that was signed
    pub challenge: String,
    /// HMAC signature of "{challenge}:{address}" (hex-encoded)
    pub signature: String,
}

/// Authentication response on successful verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub authenticated: bool,
    /// Ledger user id (normalized wallet address, or a demo id)
    pub user_id: String,
    /// Session token for subsequent requests
    pub session_token: String,
    /// When the session expires (ms)
    pub expires_at: i64,
    /// Whether this is a sandbox session
    pub demo: bool,
}

/// Session stored in memory and, when configured, in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: String,
    /// When session was created (ms)
    pub created_at: i64,
    /// When session expires (ms)
    pub expires_at: i64,
    #[serde(default)]
    pub demo: bool,
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub session_token: String,
    pub demo: bool,
}

impl Default for AuthChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthChallenge {
    /// Create a new challenge with 5-minute expiry.
    pub fn new() -> Self {
        use rand::Rng;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut rng = rand::thread_rng();
        let challenge: String = (0..32)
            .map(|_| format!("{:02x}", rng.gen::<u8>()))
            .collect();

        Self {
            challenge,
            timestamp,
            expires_at: timestamp + 5 * 60 * 1000, // 5 minutes
        }
    }

    /// Check if challenge has expired.
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp_millis() > self.expires_at
    }
}

impl Session {
    /// Create a new session valid for `ttl_hours`.
    pub fn new(user_id: String, ttl_hours: i64, demo: bool) -> Self {
        let now = chrono::Utc::now().timestamp_millis();

        Self {
            token: uuid::Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            expires_at: now + ttl_hours * 60 * 60 * 1000,
            demo,
        }
    }

    /// Check if session has expired.
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp_millis() > self.expires_at
    }

    /// Seconds until expiry, for Redis TTLs.
    pub fn ttl_seconds(&self) -> i64 {
        ((self.expires_at - chrono::Utc::now().timestamp_millis()) / 1000).max(1)
    }
}

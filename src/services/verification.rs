//! Identity Verification
//!
//! Records humanness proofs relayed from the verification provider and
//! answers whether a user may trade. A proof's nullifier hash is bound to the
//! first user that presents it.
//!
//! Submissions carry an HMAC-SHA256 attestation over
//! "{user_id}:{nullifier_hash}" signed with the shared verification secret.
//! Without a secret, unsigned submissions are accepted in development only.

use crate::config::Environment;
use crate::services::SqliteStore;
use crate::types::{IdentityProof, ProofSubmission, VerificationStatus};
use async_trait::async_trait;
use axum::{http::StatusCode, response::IntoResponse, Json};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Answers whether a proof is recorded as verified for a user.
#[async_trait]
pub trait IdentityGate: Send + Sync {
    async fn is_verified(&self, user_id: &str, proof: &str) -> bool;
}

/// Verification errors.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Nullifier hash is required")]
    MissingNullifier,

    #[error("Attestation is missing or invalid")]
    InvalidAttestation,

    #[error("Proof already used by another account")]
    NullifierInUse,

    #[error("Verification is not configured")]
    NotConfigured,

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl IntoResponse for VerificationError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            VerificationError::MissingNullifier => (StatusCode::BAD_REQUEST, "MISSING_NULLIFIER"),
            VerificationError::InvalidAttestation => {
                (StatusCode::UNAUTHORIZED, "INVALID_ATTESTATION")
            }
            VerificationError::NullifierInUse => (StatusCode::CONFLICT, "NULLIFIER_IN_USE"),
            VerificationError::NotConfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, "VERIFICATION_NOT_CONFIGURED")
            }
            VerificationError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Default identity gate backed by SQLite.
#[derive(Clone)]
pub struct VerificationRegistry {
    sqlite: Arc<SqliteStore>,
    /// nullifier_hash -> proof
    proofs: Arc<DashMap<String, IdentityProof>>,
    secret: Option<String>,
    environment: Environment,
}

impl VerificationRegistry {
    pub fn new(sqlite: Arc<SqliteStore>, secret: Option<String>, environment: Environment) -> Self {
        Self {
            sqlite,
            proofs: Arc::new(DashMap::new()),
            secret,
            environment,
        }
    }

    /// Check a submission's attestation for a user.
    fn check_attestation(&self, user_id: &str, submission: &ProofSubmission) -> Result<(), VerificationError> {
        let Some(secret) = self.secret.as_deref() else {
            if self.environment.is_development() {
                debug!("Accepting unsigned proof for {} (development)", user_id);
                return Ok(());
            }
            return Err(VerificationError::NotConfigured);
        };

        let attestation = submission
            .attestation
            .as_deref()
            .ok_or(VerificationError::InvalidAttestation)?;
        let signature = hex::decode(attestation.strip_prefix("0x").unwrap_or(attestation))
            .map_err(|_| VerificationError::InvalidAttestation)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| VerificationError::NotConfigured)?;
        mac.update(format!("{}:{}", user_id, submission.nullifier_hash).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| VerificationError::InvalidAttestation)
    }

    /// Record a proof for a user. Re-submitting the user's own proof is a no-op.
    pub fn record_proof(
        &self,
        user_id: &str,
        submission: &ProofSubmission,
    ) -> Result<IdentityProof, VerificationError> {
        let nullifier = submission.nullifier_hash.trim();
        if nullifier.is_empty() {
            return Err(VerificationError::MissingNullifier);
        }

        if let Err(e) = self.check_attestation(user_id, submission) {
            warn!("Rejected proof submission for {}: {}", user_id, e);
            return Err(e);
        }

        if let Some(existing) = self.lookup(nullifier)? {
            if existing.user_id == user_id {
                return Ok(existing);
            }
            warn!("Nullifier reuse attempted by {}", user_id);
            return Err(VerificationError::NullifierInUse);
        }

        let proof = IdentityProof::new(nullifier.to_string(), user_id.to_string(), submission.verification_level);
        if !self.sqlite.insert_identity_proof(&proof)? {
            // Lost a race with another submission of the same nullifier
            return match self.lookup(nullifier)? {
                Some(existing) if existing.user_id == user_id => Ok(existing),
                _ => Err(VerificationError::NullifierInUse),
            };
        }

        self.proofs.insert(proof.nullifier_hash.clone(), proof.clone());
        info!("Recorded {} proof for {}", proof.verification_level.as_str(), user_id);
        Ok(proof)
    }

    /// Verification state of a user.
    pub fn status(&self, user_id: &str) -> Result<VerificationStatus, VerificationError> {
        Ok(self.sqlite.latest_identity_proof(user_id)?.into())
    }

    fn lookup(&self, nullifier: &str) -> Result<Option<IdentityProof>, rusqlite::Error> {
        if let Some(proof) = self.proofs.get(nullifier) {
            return Ok(Some(proof.clone()));
        }
        let proof = self.sqlite.get_identity_proof(nullifier)?;
        if let Some(ref p) = proof {
            self.proofs.insert(nullifier.to_string(), p.clone());
        }
        Ok(proof)
    }
}

#[async_trait]
impl IdentityGate for VerificationRegistry {
    async fn is_verified(&self, user_id: &str, proof: &str) -> bool {
        match self.lookup(proof.trim()) {
            Ok(Some(p)) => p.user_id == user_id,
            Ok(None) => false,
            Err(e) => {
                warn!("Identity lookup failed: {}", e);
                false
            }
        }
    }
}

/// Sign a proof attestation the way the verification provider does.
pub fn sign_attestation(secret: &str, user_id: &str, nullifier_hash: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{}:{}", user_id, nullifier_hash).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerificationLevel;

    fn create_test_registry(secret: Option<&str>, environment: Environment) -> VerificationRegistry {
        let sqlite = Arc::new(SqliteStore::new_in_memory().unwrap());
        VerificationRegistry::new(sqlite, secret.map(String::from), environment)
    }

    fn submission(nullifier: &str, attestation: Option<String>) -> ProofSubmission {
        ProofSubmission {
            nullifier_hash: nullifier.to_string(),
            verification_level: VerificationLevel::Orb,
            attestation,
        }
    }

    #[tokio::test]
    async fn test_signed_proof_verifies() {
        let registry = create_test_registry(Some("s3cret"), Environment::Production);
        let attestation = sign_attestation("s3cret", "0xalice", "0xnull").unwrap();

        registry
            .record_proof("0xalice", &submission("0xnull", Some(attestation)))
            .unwrap();

        assert!(registry.is_verified("0xalice", "0xnull").await);
        assert!(!registry.is_verified("0xbob", "0xnull").await);
        assert!(!registry.is_verified("0xalice", "0xother").await);
        assert!(registry.status("0xalice").unwrap().verified);
    }

    #[test]
    fn test_bad_attestation_rejected() {
        let registry = create_test_registry(Some("s3cret"), Environment::Production);
        let forged = sign_attestation("wrong", "0xalice", "0xnull").unwrap();

        let err = registry
            .record_proof("0xalice", &submission("0xnull", Some(forged)))
            .unwrap_err();
        assert!(matches!(err, VerificationError::InvalidAttestation));

        let err = registry.record_proof("0xalice", &submission("0xnull", None)).unwrap_err();
        assert!(matches!(err, VerificationError::InvalidAttestation));
    }

    #[test]
    fn test_unsigned_proofs_only_in_development() {
        let dev = create_test_registry(None, Environment::Development);
        assert!(dev.record_proof("0xalice", &submission("0xnull", None)).is_ok());

        let prod = create_test_registry(None, Environment::Production);
        let err = prod.record_proof("0xalice", &submission("0xnull", None)).unwrap_err();
        assert!(matches!(err, VerificationError::NotConfigured));
    }

    #[test]
    fn test_nullifier_bound_to_first_user() {
        let registry = create_test_registry(None, Environment::Development);
        registry.record_proof("0xalice", &submission("0xnull", None)).unwrap();

        // Same user again is fine
        registry.record_proof("0xalice", &submission("0xnull", None)).unwrap();

        let err = registry.record_proof("0xbob", &submission("0xnull", None)).unwrap_err();
        assert!(matches!(err, VerificationError::NullifierInUse));
    }

    #[test]
    fn test_empty_nullifier() {
        let registry = create_test_registry(None, Environment::Development);
        let err = registry.record_proof("0xalice", &submission("  ", None)).unwrap_err();
        assert!(matches!(err, VerificationError::MissingNullifier));
        assert!(!registry.status("0xalice").unwrap().verified);
    }
}

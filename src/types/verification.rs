//! Identity Verification Types

use serde::{Deserialize, Serialize};

/// Proof level reported by the verification provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    Orb,
    #[default]
    Device,
}

impl VerificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationLevel::Orb => "orb",
            VerificationLevel::Device => "device",
        }
    }
}

impl std::str::FromStr for VerificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orb" => Ok(VerificationLevel::Orb),
            "device" => Ok(VerificationLevel::Device),
            other => Err(format!("unknown verification level: {}", other)),
        }
    }
}

/// A recorded identity proof. The nullifier is bound to one user forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProof {
    pub nullifier_hash: String,
    pub user_id: String,
    pub verification_level: VerificationLevel,
    /// When the proof was recorded (ms)
    pub verified_at: i64,
}

impl IdentityProof {
    pub fn new(nullifier_hash: String, user_id: String, verification_level: VerificationLevel) -> Self {
        Self {
            nullifier_hash,
            user_id,
            verification_level,
            verified_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Proof submission relayed from the verification provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSubmission {
    pub nullifier_hash: String,
    #[serde(default)]
    pub verification_level: VerificationLevel,
    /// HMAC-SHA256 over "{user_id}:{nullifier_hash}" (hex)
    #[serde(default)]
    pub attestation: Option<String>,
}

/// Verification state of the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullifier_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_level: Option<VerificationLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<i64>,
}

impl From<Option<IdentityProof>> for VerificationStatus {
    fn from(proof: Option<IdentityProof>) -> Self {
        match proof {
            Some(p) => Self {
                verified: true,
                nullifier_hash: Some(p.nullifier_hash),
                verification_level: Some(p.verification_level),
                verified_at: Some(p.verified_at),
            },
            None => Self {
                verified: false,
                nullifier_hash: None,
                verification_level: None,
                verified_at: None,
            },
        }
    }
}

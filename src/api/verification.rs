//! Identity verification endpoints.

use super::auth::Authenticated;
use super::ApiResponse;
use crate::services::VerificationError;
use crate::types::{IdentityProof, ProofSubmission, VerificationStatus};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

/// POST /api/verification/proofs
///
/// Record an attested proof for the caller.
async fn submit_proof(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(submission): Json<ProofSubmission>,
) -> Result<Json<ApiResponse<IdentityProof>>, VerificationError> {
    let proof = state.verification.record_proof(&auth.user.user_id, &submission)?;
    Ok(Json(ApiResponse::new(proof)))
}

/// GET /api/verification/status
async fn get_status(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<ApiResponse<VerificationStatus>>, VerificationError> {
    let status = state.verification.status(&auth.user.user_id)?;
    Ok(Json(ApiResponse::new(status)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/proofs", post(submit_proof))
        .route("/status", get(get_status))
}

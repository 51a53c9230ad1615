use super::{parsed_col, SqliteStore};
use crate::types::IdentityProof;
use rusqlite::{params, OptionalExtension, Row};

fn proof_from_row(row: &Row<'_>) -> rusqlite::Result<IdentityProof> {
    Ok(IdentityProof {
        nullifier_hash: row.get(0)?,
        user_id: row.get(1)?,
        verification_level: parsed_col(row, 2)?,
        verified_at: row.get(3)?,
    })
}

impl SqliteStore {
    // ========== Identity Proof Methods ==========

    /// Bind a nullifier to a user. Returns false if the nullifier is taken.
    pub fn insert_identity_proof(&self, proof: &IdentityProof) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO identity_proofs
             (nullifier_hash, user_id, verification_level, verified_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                proof.nullifier_hash,
                proof.user_id,
                proof.verification_level.as_str(),
                proof.verified_at,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn get_identity_proof(&self, nullifier_hash: &str) -> Result<Option<IdentityProof>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            "SELECT nullifier_hash, user_id, verification_level, verified_at
             FROM identity_proofs WHERE nullifier_hash = ?1",
            params![nullifier_hash],
            proof_from_row,
        )
        .optional()
    }

    /// Most recent proof recorded for a user.
    pub fn latest_identity_proof(&self, user_id: &str) -> Result<Option<IdentityProof>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            "SELECT nullifier_hash, user_id, verification_level, verified_at
             FROM identity_proofs WHERE user_id = ?1
             ORDER BY verified_at DESC LIMIT 1",
            params![user_id],
            proof_from_row,
        )
        .optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VerificationLevel;

    #[test]
    fn test_nullifier_binds_once() {
        let store = SqliteStore::new_in_memory().unwrap();
        let proof = IdentityProof::new("0xnull".to_string(), "0xalice".to_string(), VerificationLevel::Orb);
        assert!(store.insert_identity_proof(&proof).unwrap());

        let stolen = IdentityProof::new("0xnull".to_string(), "0xbob".to_string(), VerificationLevel::Orb);
        assert!(!store.insert_identity_proof(&stolen).unwrap());

        let loaded = store.get_identity_proof("0xnull").unwrap().unwrap();
        assert_eq!(loaded.user_id, "0xalice");
        assert_eq!(store.latest_identity_proof("0xalice").unwrap(), Some(proof));
        assert!(store.latest_identity_proof("0xbob").unwrap().is_none());
    }
}

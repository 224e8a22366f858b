//! Download-secret handling.
//!
//! Secrets are stored as Argon2id PHC strings (`$argon2id$v=19$...`), which
//! carry their own salt and cost parameters. Nothing in here ever returns or
//! logs the clear value.

use crate::error::{Error, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::sync::OnceLock;
use uuid::Uuid;

/// Hashes `secret` under a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| Error::Credential(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| Error::Credential(e.to_string()))?;
    Ok(hash.to_string())
}

/// Checks `candidate` against a stored hash. Malformed hashes never verify.
pub fn verify_secret(stored: &str, candidate: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

/// Spends the same work as a real check when there is no stored hash, so an
/// unknown project cannot be told apart from a wrong password by timing.
pub fn verify_against_nothing(candidate: &str) {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    if let Some(decoy) = DECOY.get_or_init(|| hash_secret("").ok()) {
        verify_secret(decoy, candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_original_secret() {
        let stored = hash_secret("s3cret").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_secret(&stored, "s3cret"));
        assert!(!verify_secret(&stored, "s3cret "));
        assert!(!verify_secret(&stored, ""));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = hash_secret("same").unwrap();
        let b = hash_secret("same").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("same"));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_secret("plain-text", "plain-text"));
        assert!(!verify_secret("$md5$00$00", "x"));
        // The previous salted-SHA-256 format is not accepted.
        assert!(!verify_secret("sha256$00ff$00ff", "x"));
        verify_against_nothing("anything");
    }
}

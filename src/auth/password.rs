// Password hashing and validation service

use crate::auth::error::AuthError;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use std::sync::OnceLock;

/// Password service for hashing and verification
pub struct PasswordService;

impl PasswordService {
    /// Hash a password using Argon2id, returning a PHC string
    pub fn hash_password(password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::PasswordHashError)
    }

    /// Verify a password against a hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|_| AuthError::PasswordHashError)?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Spend one Argon2 verification on a fixed hash and discard the result.
    /// Logins for unknown emails call this so they cost the same as a wrong password.
    pub fn verify_dummy(password: &str) {
        static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
        let hash = DUMMY_HASH.get_or_init(|| Self::hash_password("no-such-principal-1").ok());
        if let Some(hash) = hash {
            let _ = Self::verify_password(password, hash);
        }
    }

    /// Validate password strength requirements
    /// At least 8 characters with at least one letter and one digit
    pub fn validate_password_strength(password: &str) -> Result<(), AuthError> {
        if password.chars().count() < 8 {
            return Err(AuthError::ValidationError(
                "Password must be at least 8 characters long".to_string(),
            ));
        }
        if !password.chars().any(|c| c.is_alphabetic()) {
            return Err(AuthError::ValidationError(
                "Password must contain at least one letter".to_string(),
            ));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::ValidationError(
                "Password must contain at least one digit".to_string(),
            ));
        }
        Ok(())
    }
}

// JWT credential signing and verification

use crate::auth::{
    error::AuthError,
    models::{Principal, Role, TokenPair},
};
use crate::config::TokenConfig;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Which of the two credential kinds a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims of the short-lived access credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,       // principal id
    pub email: String,
    pub role: Role,
    pub iat: i64,        // issued at timestamp
    pub exp: i64,        // expiration timestamp
    pub typ: TokenKind,
}

/// Claims of the long-lived refresh credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,       // principal id
    pub ver: i64,        // token_version at issuance
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenKind,
}

/// Source of "now" in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self { now: AtomicI64::new(now) }
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Short SHA-256 fingerprint used to refer to a token in logs
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

/// Token service for JWT operations
///
/// Signing and verification are pure: nothing is stored, and a credential
/// is judged only by its signature, its kind and its expiry. Whether a
/// refresh credential is still current is the rotation service's call.
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_duration: i64,  // in seconds
    refresh_token_duration: i64, // in seconds
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a TokenService with one secret for both kinds
    /// Access tokens expire in 15 minutes (900 seconds)
    /// Refresh tokens expire in 7 days (604800 seconds)
    pub fn new(secret: String) -> Self {
        Self::from_config(&TokenConfig::with_secret(secret))
    }

    pub fn from_config(config: &TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_token_duration: config.access_ttl_seconds,
            refresh_token_duration: config.refresh_ttl_seconds,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock, mostly for tests
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn access_token_duration(&self) -> i64 {
        self.access_token_duration
    }

    pub fn refresh_token_duration(&self) -> i64 {
        self.refresh_token_duration
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Generate an access token for the principal
    pub fn generate_access_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let now = self.now();
        let claims = AccessClaims {
            sub: principal.id,
            email: principal.email.clone(),
            role: principal.role,
            iat: now,
            exp: now + self.access_token_duration,
            typ: TokenKind::Access,
        };
        sign(&claims, &self.access_encoding)
    }

    /// Generate a refresh token embedding the given token version
    pub fn generate_refresh_token(&self, principal_id: Uuid, token_version: i64) -> Result<String, AuthError> {
        let now = self.now();
        let claims = RefreshClaims {
            sub: principal_id,
            ver: token_version,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.refresh_token_duration,
            typ: TokenKind::Refresh,
        };
        sign(&claims, &self.refresh_encoding)
    }

    /// Generate both tokens, the refresh one carrying `token_version`
    pub fn generate_token_pair(&self, principal: &Principal, token_version: i64) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.generate_access_token(principal)?,
            refresh_token: self.generate_refresh_token(principal.id, token_version)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_duration,
        })
    }

    /// Validate an access token: signature, kind, then expiry
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let claims: AccessClaims = verify(token, &self.access_decoding)?;
        if claims.typ != TokenKind::Access {
            return Err(AuthError::InvalidCredential);
        }
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    /// Validate a refresh token: signature, kind, then expiry
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        let claims: RefreshClaims = verify(token, &self.refresh_decoding)?;
        if claims.typ != TokenKind::Refresh {
            return Err(AuthError::InvalidCredential);
        }
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    // No leeway: a credential is dead at the exact second it expires.
    fn check_expiry(&self, exp: i64) -> Result<(), AuthError> {
        if self.now() >= exp {
            return Err(AuthError::ExpiredCredential);
        }
        Ok(())
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
}

// Signature and structure only; expiry is checked against our own clock.
fn verify<T: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidCredential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET: &str = "test_secret_key_for_testing_purposes";

    // Helper to create a test token service
    fn test_token_service() -> TokenService {
        TokenService::new(SECRET.to_string())
    }

    fn test_principal(email: &str) -> Principal {
        Principal::new(email, "unused", Role::User)
    }

    #[test]
    fn test_access_token_expiration_is_15_minutes() {
        let service = test_token_service();
        let token = service.generate_access_token(&test_principal("test@example.com")).unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.exp - claims.iat, 900, "Access token should expire in exactly 15 minutes");
    }

    #[test]
    fn test_refresh_token_expiration_is_7_days() {
        let service = test_token_service();
        let token = service.generate_refresh_token(Uuid::new_v4(), 0).unwrap();
        let claims = service.validate_refresh_token(&token).unwrap();

        assert_eq!(claims.exp - claims.iat, 604800, "Refresh token should expire in exactly 7 days");
    }

    #[test]
    fn test_configured_lifetimes_are_used() {
        let mut config = TokenConfig::with_secret(SECRET);
        config.access_ttl_seconds = 60;
        config.refresh_ttl_seconds = 3600;
        let service = TokenService::from_config(&config);

        let pair = service.generate_token_pair(&test_principal("a@example.com"), 0).unwrap();
        let access = service.validate_access_token(&pair.access_token).unwrap();
        let refresh = service.validate_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(access.exp - access.iat, 60);
        assert_eq!(refresh.exp - refresh.iat, 3600);
        assert_eq!(pair.expires_in, 60);
        assert_eq!(pair.token_type, "Bearer");
    }

    #[test]
    fn test_claims_carry_identity_and_version() {
        let service = test_token_service();
        let mut principal = test_principal("user@example.com");
        principal.role = Role::Admin;

        let pair = service.generate_token_pair(&principal, 7).unwrap();
        let access = service.validate_access_token(&pair.access_token).unwrap();
        assert_eq!(access.sub, principal.id);
        assert_eq!(access.email, "user@example.com");
        assert_eq!(access.role, Role::Admin);

        let refresh = service.validate_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, principal.id);
        assert_eq!(refresh.ver, 7);
    }

    #[test]
    fn test_refresh_tokens_minted_together_differ() {
        let service = test_token_service();
        let id = Uuid::new_v4();
        let a = service.generate_refresh_token(id, 3).unwrap();
        let b = service.generate_refresh_token(id, 3).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let service = test_token_service();

        for token in ["", "not.a.token", "invalid_token_format", "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.invalid.signature"] {
            assert!(matches!(service.validate_access_token(token), Err(AuthError::InvalidCredential)));
            assert!(matches!(service.validate_refresh_token(token), Err(AuthError::InvalidCredential)));
        }
    }

    #[test]
    fn test_token_signature_verification() {
        let service1 = TokenService::new("secret1".to_string());
        let service2 = TokenService::new("secret2".to_string());

        let token = service1.generate_refresh_token(Uuid::new_v4(), 0).unwrap();
        assert!(service1.validate_refresh_token(&token).is_ok());
        assert!(matches!(service2.validate_refresh_token(&token), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let service = test_token_service();
        let token = service.generate_refresh_token(Uuid::new_v4(), 0).unwrap();
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        // Swap in the payload of a different token with the original signature.
        let other = service.generate_refresh_token(Uuid::new_v4(), 5).unwrap();
        parts[1] = other.split('.').nth(1).unwrap().to_string();

        let forged = parts.join(".");
        assert!(matches!(service.validate_refresh_token(&forged), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let service = test_token_service();
        let pair = service.generate_token_pair(&test_principal("a@example.com"), 0).unwrap();

        assert!(matches!(service.validate_refresh_token(&pair.access_token), Err(AuthError::InvalidCredential)));
        assert!(matches!(service.validate_access_token(&pair.refresh_token), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_separate_refresh_secret() {
        let mut config = TokenConfig::with_secret(SECRET);
        config.refresh_secret = "another_secret_key_for_refresh_tokens".to_string();
        let service = TokenService::from_config(&config);
        let shared = test_token_service();

        let token = service.generate_refresh_token(Uuid::new_v4(), 0).unwrap();
        assert!(service.validate_refresh_token(&token).is_ok());
        assert!(shared.validate_refresh_token(&token).is_err());
    }

    #[test]
    fn test_expiry_boundary_has_no_leeway() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let service = test_token_service().with_clock(clock.clone());
        let token = service.generate_refresh_token(Uuid::new_v4(), 0).unwrap();

        clock.advance(604_799);
        assert!(service.validate_refresh_token(&token).is_ok());

        clock.advance(1);
        assert!(matches!(service.validate_refresh_token(&token), Err(AuthError::ExpiredCredential)));
    }

    #[test]
    fn test_expired_access_token_is_rejected() {
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            role: Role::User,
            iat: Utc::now().timestamp() - 1000,
            exp: Utc::now().timestamp() - 500, // Expired 500 seconds ago
            typ: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();

        let service = test_token_service();
        assert!(matches!(service.validate_access_token(&token), Err(AuthError::ExpiredCredential)));
    }

    #[test]
    fn test_bad_signature_wins_over_expiry() {
        let claims = RefreshClaims {
            sub: Uuid::new_v4(),
            ver: 0,
            jti: Uuid::new_v4(),
            iat: 0,
            exp: 1,
            typ: TokenKind::Refresh,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"someone_elses_secret")).unwrap();

        let service = test_token_service();
        assert!(matches!(service.validate_refresh_token(&token), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_missing_version_claim_is_invalid() {
        #[derive(Serialize)]
        struct NoVersion {
            sub: Uuid,
            jti: Uuid,
            iat: i64,
            exp: i64,
            typ: TokenKind,
        }
        let now = Utc::now().timestamp();
        let claims = NoVersion { sub: Uuid::new_v4(), jti: Uuid::new_v4(), iat: now, exp: now + 60, typ: TokenKind::Refresh };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();

        let service = test_token_service();
        assert!(matches!(service.validate_refresh_token(&token), Err(AuthError::InvalidCredential)));
    }

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        let fp = token_fingerprint("abc");
        assert_eq!(fp.len(), 12);
        assert_eq!(fp, token_fingerprint("abc"));
        assert_ne!(fp, token_fingerprint("abd"));
    }

    // Property-based tests using proptest

    proptest! {
        #[test]
        fn prop_refresh_claims_round_trip(
            version in 0i64..1_000_000,
            email in "[a-z]{3,10}@[a-z]{3,10}\\.(com|org|net)"
        ) {
            let service = test_token_service();
            let principal = test_principal(&email);
            let pair = service.generate_token_pair(&principal, version)?;

            let refresh = service.validate_refresh_token(&pair.refresh_token)?;
            prop_assert_eq!(refresh.sub, principal.id);
            prop_assert_eq!(refresh.ver, version);
            prop_assert_eq!(refresh.exp - refresh.iat, 604800);

            let access = service.validate_access_token(&pair.access_token)?;
            prop_assert_eq!(access.email, email);
            prop_assert_eq!(access.exp - access.iat, 900);
        }

        #[test]
        fn prop_malformed_tokens_rejected(
            malformed in "[a-zA-Z0-9._-]{0,80}"
        ) {
            let service = test_token_service();
            prop_assert!(service.validate_refresh_token(&malformed).is_err());
            prop_assert!(service.validate_access_token(&malformed).is_err());
        }
    }
}

// Authentication service - issuance, rotation and revocation

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{Principal, PrincipalResponse, Role, TokenPair},
    password::PasswordService,
    repository::PrincipalStore,
    token::{token_fingerprint, AccessClaims, RefreshClaims, TokenService},
};

/// Authentication service coordinating all auth operations
///
/// Refresh credentials are never stored. A refresh credential is current
/// exactly while its embedded `ver` equals the principal's `token_version`,
/// so bumping that counter is the only thing needed to retire it.
pub struct AuthService {
    store: Arc<dyn PrincipalStore>,
    token_service: TokenService,
}

impl AuthService {
    /// Create a new AuthService
    pub fn new(store: Arc<dyn PrincipalStore>, token_service: TokenService) -> Self {
        Self { store, token_service }
    }

    pub fn token_service(&self) -> &TokenService {
        &self.token_service
    }

    /// Issue a fresh pair for a principal whose identity was just established.
    /// The refresh credential embeds the principal's current token_version.
    pub fn issue(&self, principal: &Principal) -> Result<TokenPair, AuthError> {
        let pair = self
            .token_service
            .generate_token_pair(principal, principal.token_version)?;
        debug!(
            principal_id = %principal.id,
            token_version = principal.token_version,
            "Issued token pair"
        );
        Ok(pair)
    }

    /// Exchange a valid refresh credential for a new pair.
    ///
    /// The new pair is signed before anything is written, then the version
    /// is advanced with a conditional update. Losing that update to a
    /// concurrent rotation or revoke is reported as `StaleCredential`, so
    /// the call either returns a complete pair or fails with no state
    /// changed.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let (claims, principal) = self.check_refresh_token(refresh_token).await?;

        let next_version = claims.ver + 1;
        let pair = self.token_service.generate_token_pair(&principal, next_version)?;

        if !self
            .store
            .compare_and_increment_version(principal.id, claims.ver)
            .await?
        {
            warn!(
                principal_id = %principal.id,
                presented_version = claims.ver,
                token = %token_fingerprint(refresh_token),
                "Lost rotation race, credential already superseded"
            );
            return Err(AuthError::StaleCredential);
        }

        info!(
            principal_id = %principal.id,
            token_version = next_version,
            "Rotated refresh token"
        );
        Ok(pair)
    }

    /// Invalidate every outstanding refresh credential of a principal.
    /// Access credentials already handed out live until their own expiry.
    pub async fn revoke(&self, principal_id: Uuid) -> Result<i64, AuthError> {
        let version = self
            .store
            .increment_version(principal_id)
            .await?
            .ok_or(AuthError::PrincipalNotFound(principal_id))?;

        info!(principal_id = %principal_id, token_version = version, "Revoked refresh tokens");
        Ok(version)
    }

    /// Log out with a refresh credential, retiring it and all its siblings.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let (claims, principal) = self.check_refresh_token(refresh_token).await?;

        if !self
            .store
            .compare_and_increment_version(principal.id, claims.ver)
            .await?
        {
            return Err(AuthError::StaleCredential);
        }

        info!(principal_id = %principal.id, "Logged out");
        Ok(())
    }

    /// Verify email and password, then issue a pair
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let principal = match self.store.find_by_email(email).await? {
            Some(principal) => principal,
            None => {
                PasswordService::verify_dummy(password);
                debug!("Login attempt for unknown email");
                return Err(AuthError::InvalidLogin);
            }
        };

        if !PasswordService::verify_password(password, &principal.password_hash)? {
            warn!(principal_id = %principal.id, "Login failed: wrong password");
            return Err(AuthError::InvalidLogin);
        }

        info!(principal_id = %principal.id, "Login succeeded");
        self.issue(&principal)
    }

    /// Create a principal at token_version 0 and issue its first pair
    pub async fn register(&self, email: &str, password: &str, role: Role) -> Result<(Principal, TokenPair), AuthError> {
        if !validator::validate_email(email) {
            return Err(AuthError::ValidationError("Invalid email format".to_string()));
        }
        PasswordService::validate_password_strength(password)?;
        let password_hash = PasswordService::hash_password(password)?;

        let principal = self
            .store
            .insert(Principal::new(email, password_hash, role))
            .await?;

        info!(principal_id = %principal.id, role = %principal.role, "Registered principal");
        let pair = self.issue(&principal)?;
        Ok((principal, pair))
    }

    /// Verify an access credential presented as a bearer token
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        self.token_service.validate_access_token(access_token)
    }

    /// Get current principal information
    pub async fn get_current_principal(&self, principal_id: Uuid) -> Result<PrincipalResponse, AuthError> {
        self.store
            .load(principal_id)
            .await?
            .map(PrincipalResponse::from)
            .ok_or(AuthError::PrincipalNotFound(principal_id))
    }

    // Signature and structure, expiry, then version: in that order.
    async fn check_refresh_token(&self, refresh_token: &str) -> Result<(RefreshClaims, Principal), AuthError> {
        let claims = self
            .token_service
            .validate_refresh_token(refresh_token)
            .map_err(|e| {
                warn!(token = %token_fingerprint(refresh_token), reason = %e, "Refresh token rejected");
                e
            })?;

        let principal = self.store.load(claims.sub).await?.ok_or_else(|| {
            warn!(principal_id = %claims.sub, "Refresh token for missing principal");
            AuthError::PrincipalNotFound(claims.sub)
        })?;

        if claims.ver != principal.token_version {
            warn!(
                principal_id = %principal.id,
                presented_version = claims.ver,
                current_version = principal.token_version,
                "Stale refresh token presented"
            );
            return Err(AuthError::StaleCredential);
        }

        Ok((claims, principal))
    }
}

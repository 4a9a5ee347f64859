// Bearer authentication for protected routes

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{error::AuthError, models::Role, service::AuthService};

/// Pull the token out of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidCredential)?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidCredential)
}

/// Authenticated principal extractor for protected routes
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub principal_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Fail with `InsufficientPermissions` unless the caller has `required`
    pub fn require_role(&self, required: Role) -> Result<(), AuthError> {
        if self.role != required {
            warn!(
                "Authorization failed: principal_id={}, required_role={}, actual_role={}",
                self.principal_id, required, self.role
            );
            return Err(AuthError::InsufficientPermissions {
                required,
                actual: self.role,
            });
        }
        debug!("Authorization successful: principal_id={}, role={}", self.principal_id, self.role);
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let service = Arc::<AuthService>::from_ref(state);
        let claims = service.authenticate(token)?;

        Ok(AuthenticatedUser {
            principal_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        models::Principal,
        repository::InMemoryPrincipalStore,
        token::{AccessClaims, TokenKind, TokenService},
    };
    use axum::http::Request;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test_secret_key_for_testing_purposes";

    fn test_service() -> Arc<AuthService> {
        Arc::new(AuthService::new(
            Arc::new(InMemoryPrincipalStore::new()),
            TokenService::new(SECRET.to_string()),
        ))
    }

    // Helper to create test parts with Authorization header
    fn create_parts_with_auth(auth_value: &str) -> Parts {
        let req = Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, auth_value)
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        parts
    }

    fn create_parts_without_auth() -> Parts {
        let (parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn test_valid_token_is_accepted() {
        let service = test_service();
        let principal = Principal::new("test@example.com", "unused", Role::Admin);
        let pair = service.issue(&principal).unwrap();

        let mut parts = create_parts_with_auth(&format!("Bearer {}", pair.access_token));
        let user = AuthenticatedUser::from_request_parts(&mut parts, &service).await.unwrap();

        assert_eq!(user.principal_id, principal.id);
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_a_bearer() {
        let service = test_service();
        let principal = Principal::new("test@example.com", "unused", Role::User);
        let pair = service.issue(&principal).unwrap();

        let mut parts = create_parts_with_auth(&format!("Bearer {}", pair.refresh_token));
        let result = AuthenticatedUser::from_request_parts(&mut parts, &service).await;
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let service = test_service();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            role: Role::User,
            iat: Utc::now().timestamp() - 1000,
            exp: Utc::now().timestamp() - 500, // Expired 500 seconds ago
            typ: TokenKind::Access,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();

        let mut parts = create_parts_with_auth(&format!("Bearer {}", token));
        let result = AuthenticatedUser::from_request_parts(&mut parts, &service).await;
        assert!(matches!(result, Err(AuthError::ExpiredCredential)));
    }

    #[tokio::test]
    async fn test_missing_authorization_header() {
        let service = test_service();
        let mut parts = create_parts_without_auth();
        let result = AuthenticatedUser::from_request_parts(&mut parts, &service).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }

    #[tokio::test]
    async fn test_invalid_bearer_format() {
        let service = test_service();
        for auth_value in ["InvalidFormat token", "token_without_bearer", "Basic dXNlcjpwYXNz", "Bearer "] {
            let mut parts = create_parts_with_auth(auth_value);
            let result = AuthenticatedUser::from_request_parts(&mut parts, &service).await;
            assert!(matches!(result, Err(AuthError::InvalidCredential)), "accepted {auth_value:?}");
        }
    }

    #[test]
    fn test_require_role() {
        let user = AuthenticatedUser {
            principal_id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            role: Role::User,
        };
        assert!(user.require_role(Role::User).is_ok());
        match user.require_role(Role::Admin).unwrap_err() {
            AuthError::InsufficientPermissions { required, actual } => {
                assert_eq!(required, Role::Admin);
                assert_eq!(actual, Role::User);
            }
            other => panic!("Expected InsufficientPermissions error, got {other:?}"),
        }
    }
}

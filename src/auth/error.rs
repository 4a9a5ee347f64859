// Authentication and rotation error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth::models::Role;

/// Message sent for every failure that should send the client back to login.
const REAUTHENTICATE_MESSAGE: &str = "Authentication required";

/// Authentication and authorization error types
///
/// The credential failures stay distinct here so they can be logged and
/// tested individually. At the HTTP boundary they collapse into one
/// undifferentiated "reauthenticate" response.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad signature, malformed token, wrong token kind or missing claims
    #[error("Invalid credential")]
    InvalidCredential,

    /// Current time is at or past the embedded expiry
    #[error("Credential has expired")]
    ExpiredCredential,

    /// Embedded token version no longer matches the principal's current one
    #[error("Credential has been superseded")]
    StaleCredential,

    /// The principal referenced by a credential no longer exists
    #[error("Principal not found: {0}")]
    PrincipalNotFound(Uuid),

    #[error("Missing authentication token")]
    MissingToken,

    /// Unknown email or wrong password
    #[error("Invalid email or password")]
    InvalidLogin,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Caller lacks the role required for the operation
    #[error("Insufficient permissions: required role '{required}', but principal has role '{actual}'")]
    InsufficientPermissions { required: Role, actual: Role },

    #[error("Token generation error: {0}")]
    TokenGenerationError(String),

    #[error("Password hashing error")]
    PasswordHashError,

    #[error("Principal store error: {0}")]
    StoreError(String),

    /// The principal named as the subject of an admin action does not exist
    #[error("Target principal not found: {0}")]
    TargetNotFound(Uuid),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::StoreError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::ValidationError(errors.to_string())
    }
}

/// JSON body returned for every error
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "REAUTHENTICATE", "VALIDATION_ERROR")
    pub error_code: String,
    pub message: String,
}

impl AuthError {
    /// True for every failure that must be answered with "log in again".
    pub fn is_reauthenticate(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredential
                | AuthError::ExpiredCredential
                | AuthError::StaleCredential
                | AuthError::PrincipalNotFound(_)
        )
    }

    /// Lets callers single out deleted accounts for their own bookkeeping.
    pub fn is_principal_gone(&self) -> bool {
        matches!(self, AuthError::PrincipalNotFound(_))
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredential
            | AuthError::ExpiredCredential
            | AuthError::StaleCredential
            | AuthError::PrincipalNotFound(_)
            | AuthError::MissingToken
            | AuthError::InvalidLogin => StatusCode::UNAUTHORIZED,
            AuthError::EmailAlreadyExists => StatusCode::CONFLICT,
            AuthError::TargetNotFound(_) => StatusCode::NOT_FOUND,
            AuthError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AuthError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            AuthError::TokenGenerationError(_)
            | AuthError::PasswordHashError
            | AuthError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code sent to clients
    pub fn error_code(&self) -> &'static str {
        match self {
            e if e.is_reauthenticate() => "REAUTHENTICATE",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidLogin => "INVALID_LOGIN",
            AuthError::EmailAlreadyExists => "CONFLICT",
            AuthError::TargetNotFound(_) => "NOT_FOUND",
            AuthError::ValidationError(_) => "VALIDATION_ERROR",
            AuthError::InsufficientPermissions { .. } => "FORBIDDEN",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Get a descriptive error message for this error
    /// This message is safe to send to clients (no sensitive data)
    pub fn error_message(&self) -> String {
        match self {
            e if e.is_reauthenticate() => REAUTHENTICATE_MESSAGE.to_string(),
            AuthError::MissingToken => "Missing authentication token".to_string(),
            AuthError::InvalidLogin => "Invalid email or password".to_string(),
            AuthError::EmailAlreadyExists => "Email already exists".to_string(),
            AuthError::TargetNotFound(_) => "Principal not found".to_string(),
            AuthError::ValidationError(msg) => msg.clone(),
            AuthError::InsufficientPermissions { required, .. } => {
                format!("Insufficient permissions: required role '{}'", required)
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::InvalidCredential
            | AuthError::ExpiredCredential
            | AuthError::StaleCredential
            | AuthError::MissingToken => warn!("Rejected credential: {}", self),
            AuthError::PrincipalNotFound(id) => {
                warn!("Credential references missing principal {}", id)
            }
            AuthError::InsufficientPermissions { required, actual } => {
                warn!("Authorization failed: required role '{}', principal has role '{}'", required, actual)
            }
            AuthError::TokenGenerationError(_)
            | AuthError::PasswordHashError
            | AuthError::StoreError(_) => error!("Internal auth error: {}", self),
            _ => {}
        }

        let body = ErrorResponse {
            error_code: self.error_code().to_string(),
            message: self.error_message(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

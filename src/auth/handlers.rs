// HTTP handlers for authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    middleware::AuthenticatedUser,
    models::{LoginRequest, PrincipalResponse, RefreshRequest, RegisterRequest, RevokeRequest, Role, TokenPair},
    service::AuthService,
};

/// Register a new principal
/// POST /api/auth/register
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Principal registered, first token pair issued", body = TokenPair),
        (status = 400, description = "Invalid email or weak password"),
        (status = 409, description = "Email already exists")
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(service): State<Arc<AuthService>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenPair>), AuthError> {
    request.validate()?;
    let (_, pair) = service
        .register(&request.email, &request.password, Role::User)
        .await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

/// Log in with email and password
/// POST /api/auth/login
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    request.validate()?;
    let pair = service.login(&request.email, &request.password).await?;
    Ok(Json(pair))
}

/// Exchange a refresh token for a new pair
/// POST /api/auth/refresh
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Reauthentication required")
    ),
    tag = "auth"
)]
pub async fn refresh_handler(
    State(service): State<Arc<AuthService>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    debug!("Refresh requested");
    let pair = service.rotate(&request.refresh_token).await?;
    Ok(Json(pair))
}

/// Retire the presented refresh token and every other one of its principal
/// POST /api/auth/logout
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Reauthentication required")
    ),
    tag = "auth"
)]
pub async fn logout_handler(
    State(service): State<Arc<AuthService>>,
    Json(request): Json<RefreshRequest>,
) -> Result<StatusCode, AuthError> {
    service.logout(&request.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke all refresh tokens of a principal (admin only)
/// POST /api/auth/revoke
#[utoipa::path(
    post,
    path = "/api/auth/revoke",
    request_body = RevokeRequest,
    responses(
        (status = 204, description = "Refresh tokens revoked"),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No principal with that id")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn revoke_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
    Json(request): Json<RevokeRequest>,
) -> Result<StatusCode, AuthError> {
    user.require_role(Role::Admin)?;
    service.revoke(request.principal_id).await.map_err(|e| match e {
        AuthError::PrincipalNotFound(id) => AuthError::TargetNotFound(id),
        other => other,
    })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get current principal information (protected endpoint)
/// GET /api/auth/me
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current principal", body = PrincipalResponse),
        (status = 401, description = "Missing or invalid access token")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<PrincipalResponse>, AuthError> {
    let principal = service.get_current_principal(user.principal_id).await?;
    Ok(Json(principal))
}

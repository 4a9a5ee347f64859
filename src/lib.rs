//! Refresh-token rotation service.
//!
//! Issues short-lived access / long-lived refresh JWT pairs and rotates
//! refresh tokens so each one can be exchanged exactly once. Revocation is
//! a single per-principal counter, `token_version`.

pub mod auth;
pub mod config;
pub mod db;

use std::sync::Arc;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use auth::{
    login_handler, logout_handler, me_handler, refresh_handler, register_handler, revoke_handler,
    AuthService,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        auth::handlers::register_handler,
        auth::handlers::login_handler,
        auth::handlers::refresh_handler,
        auth::handlers::logout_handler,
        auth::handlers::revoke_handler,
        auth::handlers::me_handler,
    ),
    components(
        schemas(
            auth::TokenPair,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::RefreshRequest,
            auth::RevokeRequest,
            auth::PrincipalResponse,
            auth::Role,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Token issuance, rotation and revocation")
    ),
    info(
        title = "Token Rotation API",
        version = "0.1.0",
        description = "Access/refresh token pairs with single-use refresh token rotation"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "auth"
)]
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds tracing and CORS layers
pub fn create_router(service: Arc<AuthService>) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/revoke", post(revoke_handler))
        .route("/api/auth/me", get(me_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(service)
}

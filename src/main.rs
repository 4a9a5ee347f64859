use std::sync::Arc;

use token_rotation::{
    auth::{AuthService, InMemoryPrincipalStore, PgPrincipalStore, PrincipalStore, TokenService},
    config::Config,
    create_router, db,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Token rotation service - Starting...");

    let config = Config::from_env().expect("Invalid configuration");
    tracing::debug!("Loaded configuration: {:?}", config);

    let store: Arc<dyn PrincipalStore> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            Arc::new(PgPrincipalStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, principals are kept in memory only");
            Arc::new(InMemoryPrincipalStore::new())
        }
    };

    let service = Arc::new(AuthService::new(store, TokenService::from_config(&config.tokens)));
    let app = create_router(service);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Token rotation service is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

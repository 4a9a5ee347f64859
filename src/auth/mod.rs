// Authentication module
// JWT access/refresh pairs with refresh-token rotation driven by a
// per-principal token version

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use handlers::{login_handler, logout_handler, me_handler, refresh_handler, register_handler, revoke_handler};
pub use middleware::AuthenticatedUser;
pub use models::{LoginRequest, Principal, PrincipalResponse, RefreshRequest, RegisterRequest, RevokeRequest, Role, TokenPair};
pub use repository::{InMemoryPrincipalStore, PgPrincipalStore, PrincipalStore};
pub use service::AuthService;
pub use token::TokenService;

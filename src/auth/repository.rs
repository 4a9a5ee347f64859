// Principal stores: the only owners of token_version

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{Principal, Role},
};

/// Identity store consulted by the rotation service
///
/// Implementations must make `compare_and_increment_version` atomic per
/// principal: of any number of concurrent calls with the same `expected`
/// value, at most one may return `true`.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Load a principal by id
    async fn load(&self, id: Uuid) -> Result<Option<Principal>, AuthError>;

    /// Find a principal by email (case-insensitive)
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError>;

    /// Insert a new principal, failing on duplicate email
    async fn insert(&self, principal: Principal) -> Result<Principal, AuthError>;

    /// Bump token_version by one only if it still equals `expected`
    async fn compare_and_increment_version(&self, id: Uuid, expected: i64) -> Result<bool, AuthError>;

    /// Bump token_version by one unconditionally, returning the new value
    /// or `None` when the principal does not exist
    async fn increment_version(&self, id: Uuid) -> Result<Option<i64>, AuthError>;
}

/// Process-local store, for tests and single-instance deployments
#[derive(Default)]
pub struct InMemoryPrincipalStore {
    principals: RwLock<HashMap<Uuid, Principal>>,
}

impl InMemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a principal, as an account deletion would
    pub async fn remove(&self, id: Uuid) -> Option<Principal> {
        self.principals.write().await.remove(&id)
    }
}

#[async_trait]
impl PrincipalStore for InMemoryPrincipalStore {
    async fn load(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        Ok(self.principals.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError> {
        let email = email.to_lowercase();
        let principals = self.principals.read().await;
        Ok(principals
            .values()
            .find(|p| p.email.to_lowercase() == email)
            .cloned())
    }

    async fn insert(&self, principal: Principal) -> Result<Principal, AuthError> {
        // Same folding as LOWER() in Postgres
        let email = principal.email.to_lowercase();
        let mut principals = self.principals.write().await;
        if principals.values().any(|p| p.email.to_lowercase() == email) {
            return Err(AuthError::EmailAlreadyExists);
        }
        principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn compare_and_increment_version(&self, id: Uuid, expected: i64) -> Result<bool, AuthError> {
        let mut principals = self.principals.write().await;
        match principals.get_mut(&id) {
            Some(principal) if principal.token_version == expected => {
                principal.token_version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_version(&self, id: Uuid) -> Result<Option<i64>, AuthError> {
        let mut principals = self.principals.write().await;
        Ok(principals.get_mut(&id).map(|principal| {
            principal.token_version += 1;
            principal.token_version
        }))
    }
}

/// Row shape of the `principals` table
#[derive(Debug, FromRow)]
struct PrincipalRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    token_version: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = AuthError;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| AuthError::StoreError(format!("unknown role '{}' for principal {}", row.role, row.id)))?;
        Ok(Principal {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            token_version: row.token_version,
            created_at: row.created_at,
        })
    }
}

const PRINCIPAL_COLUMNS: &str = "id, email, password_hash, role, token_version, created_at";

/// PostgreSQL-backed store; the conditional UPDATE keeps rotation correct
/// across several server instances sharing one database.
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    /// Create a new PgPrincipalStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn load(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn insert(&self, principal: Principal) -> Result<Principal, AuthError> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "INSERT INTO principals (id, email, password_hash, role, token_version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PRINCIPAL_COLUMNS}"
        ))
        .bind(principal.id)
        .bind(&principal.email)
        .bind(&principal.password_hash)
        .bind(principal.role.as_str())
        .bind(principal.token_version)
        .bind(principal.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // Check for unique constraint violation
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return AuthError::EmailAlreadyExists;
                }
            }
            AuthError::StoreError(e.to_string())
        })?;

        Principal::try_from(row)
    }

    async fn compare_and_increment_version(&self, id: Uuid, expected: i64) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE principals SET token_version = token_version + 1 WHERE id = $1 AND token_version = $2",
        )
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_version(&self, id: Uuid) -> Result<Option<i64>, AuthError> {
        let version = sqlx::query_scalar::<_, i64>(
            "UPDATE principals SET token_version = token_version + 1 WHERE id = $1 RETURNING token_version",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(version)
    }
}

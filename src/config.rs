// Service configuration loaded from the environment

use thiserror::Error;

/// Default access credential lifetime: 15 minutes
pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 900;
/// Default refresh credential lifetime: 7 days
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 604_800;
/// HS256 secrets shorter than this are rejected
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("{key} is not a valid value: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be at least 32 bytes long")]
    WeakSecret(&'static str),

    #[error("ACCESS_TOKEN_TTL_SECONDS ({access}) must be shorter than REFRESH_TOKEN_TTL_SECONDS ({refresh})")]
    TtlOrder { access: i64, refresh: i64 },
}

/// Signing secrets and lifetimes for issued credentials
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

// Secrets stay out of Debug output.
impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .finish()
    }
}

impl TokenConfig {
    /// Same secret for both kinds, default lifetimes
    pub fn with_secret(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self {
            access_secret: secret.clone(),
            refresh_secret: secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Absent means the in-memory principal store is used
    pub database_url: Option<String>,
    pub tokens: TokenConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let access_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if access_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret("JWT_SECRET"));
        }
        let refresh_secret = var("JWT_REFRESH_SECRET").unwrap_or_else(|| access_secret.clone());
        if refresh_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret("JWT_REFRESH_SECRET"));
        }

        let access_ttl_seconds = parse_ttl(
            "ACCESS_TOKEN_TTL_SECONDS",
            var("ACCESS_TOKEN_TTL_SECONDS"),
            DEFAULT_ACCESS_TTL_SECONDS,
        )?;
        let refresh_ttl_seconds = parse_ttl(
            "REFRESH_TOKEN_TTL_SECONDS",
            var("REFRESH_TOKEN_TTL_SECONDS"),
            DEFAULT_REFRESH_TTL_SECONDS,
        )?;
        if access_ttl_seconds >= refresh_ttl_seconds {
            return Err(ConfigError::TtlOrder {
                access: access_ttl_seconds,
                refresh: refresh_ttl_seconds,
            });
        }

        let port = match var("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            None => 8080,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            database_url: var("DATABASE_URL"),
            tokens: TokenConfig {
                access_secret,
                refresh_secret,
                access_ttl_seconds,
                refresh_ttl_seconds,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_ttl(key: &'static str, raw: Option<String>, default: i64) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(ttl) if ttl > 0 => Ok(ttl),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

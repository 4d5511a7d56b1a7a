//! Server configuration.
//!
//! Reads from env vars:
//!   DSV_DATABASE_URL         Postgres connection string (optional; in-memory store when unset)
//!   DSV_JWT_SECRET           JWT HMAC secret (required)
//!   DSV_BIND_ADDR            listen address (default: 0.0.0.0:4200)
//!   DSV_DB_MAX_CONNECTIONS   pool size (default: 10)
//! plus the engine variables read by `EngineConfig::from_env`.

use dsv_core::{DsvError, EngineConfig};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, DsvError> {
        Self::from_lookup(|key| std::env::var(key).ok(), EngineConfig::from_env()?)
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        engine: EngineConfig,
    ) -> Result<Self, DsvError> {
        let jwt_secret = lookup("DSV_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DsvError::Validation("DSV_JWT_SECRET must be set".into()))?;

        let db_max_connections = match lookup("DSV_DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                DsvError::Validation(format!(
                    "DSV_DB_MAX_CONNECTIONS must be a positive integer, got '{raw}'"
                ))
            })?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url: lookup("DSV_DATABASE_URL").filter(|s| !s.is_empty()),
            jwt_secret,
            bind_addr: lookup("DSV_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            db_max_connections,
            engine,
        })
    }
}

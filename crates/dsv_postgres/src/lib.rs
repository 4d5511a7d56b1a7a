//! PostgreSQL adapter for data set versioning.
//!
//! `PgStore` implements every `dsv_core` port over a single `PgPool`.

mod error;
mod rows;
pub mod store;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use dsv_core::error::DsvError;

pub use store::PgStore;

/// Open a pool with the given size and a 30s acquire timeout.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgStore, DsvError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(error::map_sqlx)?;
    tracing::info!(
        url = %mask_database_url(database_url),
        max_connections,
        "connected to postgres"
    );
    Ok(PgStore::new(pool))
}

/// Hide the password in a connection URL before logging it.
pub fn mask_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}

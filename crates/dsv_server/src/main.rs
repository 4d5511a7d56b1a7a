//! dsv_server: standalone REST server for data set versioning.
//!
//! See `config` for the environment variables it reads. A `.env` file in the
//! working directory is loaded first if present.

use std::sync::Arc;

use dsv_core::memory::MemoryStore;
use dsv_core::Stores;
use dsv_server::config::ServerConfig;
use dsv_server::middleware::jwt::JwtConfig;
use dsv_server::router::build_router;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dsv_server=debug,dsv_core=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let stores = match &config.database_url {
        Some(url) => {
            let store = dsv_postgres::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            Stores::from_backend(Arc::new(store))
        }
        None => {
            tracing::warn!("DSV_DATABASE_URL not set, using in-memory store");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    tracing::info!(
        batch_size = config.engine.meta_insert_batch_size,
        max_retries = config.engine.max_batch_retries,
        "engine configured"
    );

    let jwt_config = JwtConfig::from_secret(config.jwt_secret.as_bytes());
    let app = build_router(stores, config.engine.clone(), jwt_config);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("dsv_server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

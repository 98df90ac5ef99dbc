pub mod migrations;
pub mod models;
pub mod postgres;
pub mod seed;
pub mod storage;

// Re-export commonly used types
pub use postgres::PgStorage;
pub use storage::{AdminOverview, Storage, StorageError, UserStats};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::AppConfig;

/// Open the connection pool. The URL comes from `DATABASE_URL`; pool
/// sizing and timeouts come from the app config. The pool is handed to
/// callers rather than cached in a global.
pub async fn connect(config: &AppConfig) -> Result<PgPool, StorageError> {
    let url = std::env::var("DATABASE_URL")
        .map_err(|_| StorageError::ConfigMissing("DATABASE_URL"))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&url)
        .await?;

    tracing::info!(
        "Created database pool (max connections: {})",
        config.database.max_connections
    );
    Ok(pool)
}

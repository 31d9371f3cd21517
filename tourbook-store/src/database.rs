use crate::app_config::DatabaseConfig;
use crate::error::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Postgres pool shared by the booking, payment and package repositories
#[derive(Clone)]
pub struct DbClient {
    pub pool: PgPool,
}

impl DbClient {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("Connected to Postgres (pool of {})", config.max_connections);
        Ok(Self { pool })
    }

    /// Apply `migrations/` in order; already-applied files are skipped.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Schema is up to date");
        Ok(())
    }
}

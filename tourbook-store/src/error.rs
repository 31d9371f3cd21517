use tourbook_core::CoreError;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
            _ => false,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        if err.is_unique_violation() {
            return CoreError::ConflictError(err.to_string());
        }
        match err {
            StoreError::Http(e) => CoreError::GatewayError(e.to_string()),
            other => CoreError::StorageError(other.to_string()),
        }
    }
}

// SQLite persistence layer

use crate::core::errors::GatewayError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub mod agents;
pub mod chats;
pub mod dual_llm;
pub mod policies;
pub mod policy_cache;

pub use agents::AgentStore;
pub use chats::ChatStore;
pub use dual_llm::DualLlmStore;
pub use policies::PolicyStore;
pub use policy_cache::PolicyCache;

/// Connect to the configured database and apply pending migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool, GatewayError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            GatewayError::Configuration(format!("Invalid database URL: {}", e))
        })?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| GatewayError::Configuration(format!("Migration failed: {}", e)))?;

    info!("Database initialized");
    Ok(pool)
}

/// Single-connection in-memory database, used by the test suites.
pub async fn connect_in_memory() -> Result<SqlitePool, GatewayError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| GatewayError::Configuration(format!("Invalid database URL: {}", e)))?
        .foreign_keys(true);

    // One connection: every pooled connection of an in-memory SQLite URL is
    // otherwise a distinct database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| GatewayError::Configuration(format!("Migration failed: {}", e)))?;

    Ok(pool)
}

pub(crate) fn parse_uuid(raw: &str) -> Result<uuid::Uuid, GatewayError> {
    uuid::Uuid::parse_str(raw)
        .map_err(|e| GatewayError::Internal(format!("Corrupt id column '{}': {}", raw, e)))
}

pub(crate) fn parse_json(raw: &str) -> Result<serde_json::Value, GatewayError> {
    serde_json::from_str(raw)
        .map_err(|e| GatewayError::Internal(format!("Corrupt JSON column: {}", e)))
}

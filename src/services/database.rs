//! Database service: wraps the SQLite pool for lifecycle (start/stop) and dependencies.
//!
//! Services that need the database should declare `dependencies: ["database"]`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::query;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::db::schema_sync::sync_schema;
use crate::services::manager::Service;

/// Service that owns the database pool.
/// Register this first so that services depending on `"database"` can start after it.
pub struct DatabaseService {
    pool: Database,
}

impl DatabaseService {
    /// Create a new database service with an already-connected pool.
    /// Use [from_config](Self::from_config) to connect from the configured URL.
    pub fn new(pool: Database) -> Self {
        Self { pool }
    }

    /// Connect the pool described by `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = Database::connect(&config.database_url, config.database_max_connections)
            .await
            .context("Database service: connect failed")?;
        Ok(Self::new(pool))
    }

    /// Access the pool (e.g. to clone for the schema). Valid until [Service::stop] is called.
    pub fn pool(&self) -> &Database {
        &self.pool
    }
}

#[async_trait]
impl Service for DatabaseService {
    fn name(&self) -> &str {
        "database"
    }

    async fn start(&self) -> Result<()> {
        info!(service = "database", "Database service starting");
        query("SELECT 1").execute(self.pool.pool()).await?;

        let sync_result = sync_schema(&self.pool)
            .await
            .context("Database service: schema sync failed")?;
        if !sync_result.tables_created.is_empty() {
            info!(
                service = "database",
                tables = ?sync_result.tables_created,
                "Created tables"
            );
        }

        info!(service = "database", "Database service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.pool.close().await;
        info!(service = "database", "Database service stopped");
        Ok(())
    }
}

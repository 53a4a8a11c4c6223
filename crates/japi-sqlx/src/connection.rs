//! Database connection management

use japi_core::{DialectKind, JapiError, Result};
use japi_shared::DatabaseConfig;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::time::Duration;
use tracing::{info, instrument};

/// Pool over any supported engine plus the dialect its URL selects
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    pool: AnyPool,
    dialect: DialectKind,
}

impl ConnectionManager {
    /// Create a new connection manager
    #[instrument(skip(connection_url))]
    pub async fn new(
        connection_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let dialect = DialectKind::from_url(connection_url).ok_or_else(|| {
            JapiError::Config(format!("unsupported database url `{connection_url}`"))
        })?;
        info!(%dialect, "Creating connection pool");

        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(connection_url)
            .await
            .map_err(|e| JapiError::Execution(format!("Failed to create pool: {}", e)))?;

        Ok(Self { pool, dialect })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.connect_timeout_secs),
        )
        .await
    }

    /// Wraps an existing pool; `dialect` must match the engine behind it.
    pub fn from_pool(pool: AnyPool, dialect: DialectKind) -> Self {
        Self { pool, dialect }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> DialectKind {
        self.dialect
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| JapiError::Execution(format!("Connection test failed: {}", e)))?;

        Ok(())
    }
}

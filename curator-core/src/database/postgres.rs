use std::{fmt, time::Duration};

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use super::repositories::{
    PostgresAuditRepository, PostgresCatalogRepository, PostgresCircuitBreakerRepository,
    PostgresSchedulerLockRepository, PostgresValidationRunRepository,
};
use crate::error::{CurationError, Result};

/// Statistics about the connection pool
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_size: u32,
    pub min_idle: u32,
}

/// Pool sizing; read from `DB_MAX_CONNECTIONS` / `DB_MIN_CONNECTIONS` when
/// not given explicitly.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn from_env() -> Self {
        let read = |key: &str, default: u32| {
            std::env::var(key)
                .ok()
                .and_then(|value| value.parse::<u32>().ok())
                .unwrap_or(default)
        };
        Self {
            max_connections: read("DB_MAX_CONNECTIONS", 10),
            min_connections: read("DB_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    settings: PoolSettings,
}

impl fmt::Debug for PostgresDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresDatabase")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .field("max_connections", &self.settings.max_connections)
            .field("min_connections", &self.settings.min_connections)
            .finish()
    }
}

impl PostgresDatabase {
    pub async fn connect(connection_string: &str, settings: PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .max_lifetime(Duration::from_secs(1800))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(connection_string)
            .await
            .map_err(|e| CurationError::Store(format!("Database connection failed: {e}")))?;

        info!(
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "database pool initialized"
        );

        Ok(Self { pool, settings })
    }

    /// Wrap an existing pool, e.g. one handed out by `#[sqlx::test]`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            settings: PoolSettings::from_env(),
        }
    }

    /// Apply the embedded migrations.
    pub async fn initialize_schema(&self) -> Result<()> {
        crate::MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| CurationError::Store(format!("Migration failed: {e}")))?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| CurationError::Store(format!("Health check failed: {e}")))?;
        Ok(())
    }

    /// Get connection pool statistics for monitoring
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_size: self.settings.max_connections,
            min_idle: self.settings.min_connections,
        }
    }

    pub fn scheduler_lock_repository(&self) -> PostgresSchedulerLockRepository {
        PostgresSchedulerLockRepository::new(self.pool.clone())
    }

    pub fn circuit_breaker_repository(&self) -> PostgresCircuitBreakerRepository {
        PostgresCircuitBreakerRepository::new(self.pool.clone())
    }

    pub fn validation_run_repository(&self) -> PostgresValidationRunRepository {
        PostgresValidationRunRepository::new(self.pool.clone())
    }

    pub fn catalog_repository(&self) -> PostgresCatalogRepository {
        PostgresCatalogRepository::new(self.pool.clone())
    }

    pub fn audit_repository(&self) -> PostgresAuditRepository {
        PostgresAuditRepository::new(self.pool.clone())
    }
}

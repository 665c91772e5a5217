use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    database::ports::{SchedulerLockRecord, SchedulerLockRepository},
    error::{CurationError, Result},
};

#[derive(Debug, Clone)]
pub struct PostgresSchedulerLockRepository {
    pool: PgPool,
}

impl PostgresSchedulerLockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LockRow {
    resource_id: String,
    locked_by: String,
    locked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    run_id: Uuid,
}

impl From<LockRow> for SchedulerLockRecord {
    fn from(row: LockRow) -> Self {
        Self {
            resource_id: row.resource_id,
            locked_by: row.locked_by,
            locked_at: row.locked_at,
            expires_at: row.expires_at,
            run_id: row.run_id,
        }
    }
}

#[async_trait]
impl SchedulerLockRepository for PostgresSchedulerLockRepository {
    async fn acquire_if_free(
        &self,
        candidate: &SchedulerLockRecord,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // The conflict branch only fires for an expired row, and the row lock
        // taken by ON CONFLICT serializes concurrent reclaimers.
        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_locks (resource_id, locked_by, locked_at, expires_at, run_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (resource_id) DO UPDATE
            SET locked_by = EXCLUDED.locked_by,
                locked_at = EXCLUDED.locked_at,
                expires_at = EXCLUDED.expires_at,
                run_id = EXCLUDED.run_id
            WHERE scheduler_locks.expires_at <= $6
            "#,
        )
        .bind(&candidate.resource_id)
        .bind(&candidate.locked_by)
        .bind(candidate.locked_at)
        .bind(candidate.expires_at)
        .bind(candidate.run_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to acquire scheduler lock: {e}"))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_if_owner(
        &self,
        resource_id: &str,
        locked_by: &str,
        run_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM scheduler_locks
            WHERE resource_id = $1 AND locked_by = $2 AND run_id = $3
            "#,
        )
        .bind(resource_id)
        .bind(locked_by)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to release scheduler lock: {e}"))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn current(&self, resource_id: &str) -> Result<Option<SchedulerLockRecord>> {
        let row = sqlx::query_as::<_, LockRow>(
            r#"
            SELECT resource_id, locked_by, locked_at, expires_at, run_id
            FROM scheduler_locks
            WHERE resource_id = $1
            "#,
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to load scheduler lock: {e}"))
        })?;

        Ok(row.map(SchedulerLockRecord::from))
    }
}

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    database::ports::{AuditEvent, AuditLog},
    error::{CurationError, Result},
};

#[derive(Debug, Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditRepository {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (id, action, entity_type, entity_id, actor, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(&event.action)
        .bind(&event.entity_type)
        .bind(&event.entity_id)
        .bind(&event.actor)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to record audit event {}: {e}", event.action))
        })?;

        Ok(())
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use crate::{
    database::ports::ValidationRunRepository,
    error::{CurationError, Result},
    validation::run::{RunCounters, ValidationRun},
};

const SELECT_RUN: &str = r#"
    SELECT id, trigger_type, triggered_by, triggered_by_display_name, status,
           current_phase, started_at, completed_at, duration_ms, counters, details,
           error_message
    FROM validation_runs
"#;

#[derive(Debug, Clone)]
pub struct PostgresValidationRunRepository {
    pool: PgPool,
}

impl PostgresValidationRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    trigger_type: String,
    triggered_by: Option<String>,
    triggered_by_display_name: Option<String>,
    status: String,
    current_phase: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    counters: Json<RunCounters>,
    details: Json<BTreeMap<String, Value>>,
    error_message: Option<String>,
}

impl TryFrom<RunRow> for ValidationRun {
    type Error = CurationError;

    fn try_from(row: RunRow) -> Result<Self> {
        let invalid = |e: crate::types::ParseEnumError| {
            CurationError::Store(format!("Corrupt validation run {}: {e}", row.id))
        };

        Ok(Self {
            id: row.id,
            trigger_type: row.trigger_type.parse().map_err(invalid)?,
            triggered_by: row.triggered_by,
            triggered_by_display_name: row.triggered_by_display_name,
            status: row.status.parse().map_err(invalid)?,
            current_phase: row.current_phase.parse().map_err(invalid)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            counters: row.counters.0,
            details: row.details.0,
            error_message: row.error_message,
        })
    }
}

#[async_trait]
impl ValidationRunRepository for PostgresValidationRunRepository {
    async fn save(&self, run: &ValidationRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO validation_runs (
                id, trigger_type, triggered_by, triggered_by_display_name, status,
                current_phase, started_at, completed_at, duration_ms, counters, details,
                error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                current_phase = EXCLUDED.current_phase,
                completed_at = EXCLUDED.completed_at,
                duration_ms = EXCLUDED.duration_ms,
                counters = EXCLUDED.counters,
                details = EXCLUDED.details,
                error_message = EXCLUDED.error_message
            "#,
        )
        .bind(run.id)
        .bind(run.trigger_type.as_str())
        .bind(run.triggered_by.as_deref())
        .bind(run.triggered_by_display_name.as_deref())
        .bind(run.status.as_str())
        .bind(run.current_phase.as_str())
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.duration_ms)
        .bind(Json(&run.counters))
        .bind(Json(&run.details))
        .bind(run.error_message.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to save validation run {}: {e}", run.id))
        })?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ValidationRun>> {
        let row = sqlx::query_as::<_, RunRow>(&format!("{SELECT_RUN} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                CurationError::Store(format!("Failed to load validation run {id}: {e}"))
            })?;

        row.map(ValidationRun::try_from).transpose()
    }

    async fn latest(&self) -> Result<Option<ValidationRun>> {
        Ok(self.history(1).await?.into_iter().next())
    }

    async fn history(&self, limit: usize) -> Result<Vec<ValidationRun>> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "{SELECT_RUN} ORDER BY started_at DESC, id DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to load validation history: {e}"))
        })?;

        rows.into_iter().map(ValidationRun::try_from).collect()
    }
}

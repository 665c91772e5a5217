use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    coordination::breaker::{CircuitBreakerState, CircuitState, ProbeStatus},
    database::ports::CircuitBreakerRepository,
    error::{CurationError, Result},
};

#[derive(Debug, Clone)]
pub struct PostgresCircuitBreakerRepository {
    pool: PgPool,
}

impl PostgresCircuitBreakerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BreakerRow {
    state: String,
    opened_at: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
    last_triggered_by: Option<String>,
    trigger_message: Option<String>,
    consecutive_failures: i32,
    last_failure_at: Option<DateTime<Utc>>,
    window_start_at: Option<DateTime<Utc>>,
    backoff_level: i32,
    probe_status: String,
    probe_started_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<BreakerRow> for CircuitBreakerState {
    type Error = CurationError;

    fn try_from(row: BreakerRow) -> Result<Self> {
        let state = CircuitState::parse(&row.state).ok_or_else(|| {
            CurationError::Store(format!("Unknown circuit state: {}", row.state))
        })?;
        let probe_status = ProbeStatus::parse(&row.probe_status).ok_or_else(|| {
            CurationError::Store(format!("Unknown probe status: {}", row.probe_status))
        })?;

        Ok(Self {
            state,
            opened_at: row.opened_at,
            cooldown_until: row.cooldown_until,
            last_triggered_by: row.last_triggered_by,
            trigger_message: row.trigger_message,
            consecutive_failures: u32::try_from(row.consecutive_failures).unwrap_or(0),
            last_failure_at: row.last_failure_at,
            window_start_at: row.window_start_at,
            backoff_level: u32::try_from(row.backoff_level).unwrap_or(0),
            probe_status,
            probe_started_at: row.probe_started_at,
            version: row.version,
        })
    }
}

fn as_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl CircuitBreakerRepository for PostgresCircuitBreakerRepository {
    async fn load(&self, resource_id: &str) -> Result<Option<CircuitBreakerState>> {
        let row = sqlx::query_as::<_, BreakerRow>(
            r#"
            SELECT state, opened_at, cooldown_until, last_triggered_by, trigger_message,
                   consecutive_failures, last_failure_at, window_start_at, backoff_level,
                   probe_status, probe_started_at, version
            FROM circuit_breaker_state
            WHERE resource_id = $1
            "#,
        )
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to load circuit breaker state: {e}"))
        })?;

        row.map(CircuitBreakerState::try_from).transpose()
    }

    async fn compare_and_set(
        &self,
        resource_id: &str,
        expected_version: i64,
        next: &CircuitBreakerState,
    ) -> Result<bool> {
        let sql = if expected_version == 0 {
            r#"
            INSERT INTO circuit_breaker_state (
                resource_id, state, opened_at, cooldown_until, last_triggered_by,
                trigger_message, consecutive_failures, last_failure_at, window_start_at,
                backoff_level, probe_status, probe_started_at, version, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            ON CONFLICT (resource_id) DO NOTHING
            "#
        } else {
            r#"
            UPDATE circuit_breaker_state
            SET state = $2,
                opened_at = $3,
                cooldown_until = $4,
                last_triggered_by = $5,
                trigger_message = $6,
                consecutive_failures = $7,
                last_failure_at = $8,
                window_start_at = $9,
                backoff_level = $10,
                probe_status = $11,
                probe_started_at = $12,
                version = $13,
                updated_at = NOW()
            WHERE resource_id = $1 AND version = $14
            "#
        };

        let mut query = sqlx::query(sql)
            .bind(resource_id)
            .bind(next.state.as_str())
            .bind(next.opened_at)
            .bind(next.cooldown_until)
            .bind(next.last_triggered_by.as_deref())
            .bind(next.trigger_message.as_deref())
            .bind(as_i32(next.consecutive_failures))
            .bind(next.last_failure_at)
            .bind(next.window_start_at)
            .bind(as_i32(next.backoff_level))
            .bind(next.probe_status.as_str())
            .bind(next.probe_started_at)
            .bind(next.version);
        if expected_version != 0 {
            query = query.bind(expected_version);
        }

        let result = query.execute(&self.pool).await.map_err(|e| {
            CurationError::Store(format!("Failed to write circuit breaker state: {e}"))
        })?;

        Ok(result.rows_affected() == 1)
    }
}

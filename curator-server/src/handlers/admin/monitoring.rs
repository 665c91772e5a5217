use axum::{Json, extract::State, http::HeaderMap};
use curator_core::{
    coordination::CircuitBreakerStatus,
    database::ports::{AuditEvent, AuditLog, SchedulerLockRecord},
    time::Clock,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    handlers::Actor,
    infra::{app_state::AppState, errors::AppResult, workers::WorkerPoolSnapshot},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMetrics {
    pub worker_pool: WorkerPoolSnapshot,
    /// Whether any instance currently holds the scheduler lock.
    pub validation_running: bool,
}

pub async fn circuit_breaker_status_handler(
    State(state): State<AppState>,
) -> AppResult<Json<CircuitBreakerStatus>> {
    Ok(Json(state.breaker().status().await?))
}

/// Force the breaker CLOSED at backoff level 0.
pub async fn circuit_breaker_reset_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<CircuitBreakerStatus>> {
    let actor = Actor::from_headers(&headers).audit_name();
    let status = state.breaker().reset().await?;

    let event = AuditEvent::new(
        "circuit_breaker_reset",
        "circuit_breaker",
        state.breaker().config().resource_id.clone(),
        actor.clone(),
        state.clock().now(),
    );
    if let Err(err) = state.audit().record(event).await {
        warn!(error = %err, "failed to record circuit breaker reset audit event");
    }

    info!(actor = %actor, "circuit breaker reset by operator");
    Ok(Json(status))
}

pub async fn metrics_handler(State(state): State<AppState>) -> Json<ValidationMetrics> {
    let validation_running = match state.validation().lock().status().await {
        Ok(holder) => holder.is_some(),
        Err(err) => {
            warn!(error = %err, "scheduler lock status unavailable for metrics");
            false
        }
    };

    Json(ValidationMetrics {
        worker_pool: state.workers().snapshot(),
        validation_running,
    })
}

/// Current lock holder, or `null` when free.
pub async fn lock_status_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Option<SchedulerLockRecord>>> {
    Ok(Json(state.validation().lock().status().await?))
}

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::warn;

use crate::infra::app_state::AppState;

pub async fn ping_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let Some(postgres) = state.postgres() else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "store": "memory" })),
        );
    };

    match postgres.health_check().await {
        Ok(()) => {
            let pool = postgres.pool_stats();
            (
                StatusCode::OK,
                Json(json!({
                    "status": "healthy",
                    "store": "postgres",
                    "pool": { "size": pool.size, "idle": pool.idle, "max": pool.max_size },
                })),
            )
        }
        Err(err) => {
            warn!(error = %err, "database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "store": "postgres" })),
            )
        }
    }
}

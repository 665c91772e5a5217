use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    handlers::admin::{
        archived::{archived_counts_handler, bulk_action_handler, list_archived_handler},
        monitoring::{
            circuit_breaker_reset_handler, circuit_breaker_status_handler,
            lock_status_handler, metrics_handler,
        },
        validation_runs::{
            get_run_handler, history_handler, latest_run_handler, trigger_all_handler,
            trigger_type_handler,
        },
    },
};

pub const BASE: &str = "/api/admin/content-validation";

pub const TRIGGER: &str = "/trigger";
pub const TRIGGER_TYPE: &str = "/trigger/{type}";
pub const STATUS: &str = "/status/{id}";
pub const HISTORY: &str = "/history";
pub const LATEST: &str = "/latest";
pub const ARCHIVED_COUNTS: &str = "/archived/counts";
pub const ARCHIVED_BULK_ACTION: &str = "/archived/bulk-action";
pub const ARCHIVED_LIST: &str = "/archived/{type}";
pub const CIRCUIT_BREAKER: &str = "/circuit-breaker";
pub const CIRCUIT_BREAKER_RESET: &str = "/circuit-breaker/reset";
pub const METRICS: &str = "/metrics";
pub const LOCK: &str = "/lock";

/// Routes relative to [`BASE`].
pub fn create_content_validation_router() -> Router<AppState> {
    Router::new()
        .route(TRIGGER, post(trigger_all_handler))
        .route(TRIGGER_TYPE, post(trigger_type_handler))
        .route(STATUS, get(get_run_handler))
        .route(HISTORY, get(history_handler))
        .route(LATEST, get(latest_run_handler))
        .route(ARCHIVED_COUNTS, get(archived_counts_handler))
        .route(ARCHIVED_BULK_ACTION, post(bulk_action_handler))
        .route(ARCHIVED_LIST, get(list_archived_handler))
        .route(CIRCUIT_BREAKER, get(circuit_breaker_status_handler))
        .route(CIRCUIT_BREAKER_RESET, post(circuit_breaker_reset_handler))
        .route(METRICS, get(metrics_handler))
        .route(LOCK, get(lock_status_handler))
}

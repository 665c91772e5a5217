use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use curator_core::{
    types::ContentType,
    validation::{RunRequest, RunScope, RunStatus, TriggerType, ValidationRun},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    handlers::Actor,
    infra::{
        app_state::AppState,
        errors::{AppError, AppResult},
        workers::execute_supervised,
    },
};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParams {
    pub max_items: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerAccepted {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub message: String,
}

/// Start a run over every content type and return while it executes on the
/// worker pool. Poll `/status/{id}` for progress.
pub async fn trigger_all_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<TriggerParams>,
) -> AppResult<Response> {
    let actor = Actor::from_headers(&headers);
    let request = RunRequest::new(RunScope::All, TriggerType::Manual)
        .with_max_items(params.max_items)
        .with_actor(actor.id, actor.name);

    let pending = state.validation().begin(request).await?;
    let run_id = pending.id();

    if let Err(rejected) = state.workers().submit(pending) {
        state
            .validation()
            .abandon(rejected, "validation worker queue is full")
            .await;
        let retry_after = state.workers().retry_after_secs();
        let body = Json(json!({
            "error": {
                "message": "Validation workers are busy, try again later",
                "status": StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            },
            "runId": run_id,
            "retryAfter": retry_after,
        }));
        let mut response = (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        return Ok(response);
    }

    info!(run_id = %run_id, "validation run queued");
    let body = TriggerAccepted {
        run_id,
        status: RunStatus::Running,
        message: "Validation started for all content types".into(),
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// Validate one content type on the request task and return the finished run.
pub async fn trigger_type_handler(
    State(state): State<AppState>,
    Path(content_type): Path<String>,
    headers: HeaderMap,
    Query(params): Query<TriggerParams>,
) -> AppResult<Json<ValidationRun>> {
    let content_type = parse_content_type(&content_type)?;
    let actor = Actor::from_headers(&headers);
    let request = RunRequest::new(RunScope::Single(content_type), TriggerType::Manual)
        .with_max_items(params.max_items)
        .with_actor(actor.id, actor.name);

    let pending = state.validation().begin(request).await?;
    let run = execute_supervised(state.validation(), pending).await?;
    Ok(Json(run))
}

pub async fn get_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<ValidationRun>> {
    Ok(Json(state.validation().get_run(run_id).await?))
}

pub async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Vec<ValidationRun>>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.validation().history(limit).await?))
}

/// Most recent run, or `null` when none was ever recorded.
pub async fn latest_run_handler(
    State(state): State<AppState>,
) -> AppResult<Json<Option<ValidationRun>>> {
    Ok(Json(state.validation().latest_run().await?))
}

pub(crate) fn parse_content_type(raw: &str) -> AppResult<ContentType> {
    ContentType::from_str(raw).map_err(|err| AppError::bad_request(err.to_string()))
}

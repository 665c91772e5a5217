use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use curator_core::validation::{
    ArchivedCounts, ArchivedPage, BulkActionRequest, BulkActionResult, BulkOutcome,
    archive::DEFAULT_LIST_LIMIT,
};
use serde::Deserialize;

use super::validation_runs::parse_content_type;
use crate::{
    handlers::Actor,
    infra::{app_state::AppState, errors::AppResult},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// Archived (and legacy unavailable) items of one type, most recently
/// validated first.
pub async fn list_archived_handler(
    State(state): State<AppState>,
    Path(content_type): Path<String>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<ArchivedPage>> {
    let content_type = parse_content_type(&content_type)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(state.archive().list(content_type, limit).await?))
}

pub async fn archived_counts_handler(
    State(state): State<AppState>,
) -> AppResult<Json<ArchivedCounts>> {
    Ok(Json(state.archive().counts().await?))
}

/// Delete or restore archived items. Answers 200 when every id succeeded,
/// 206 on partial success and 500 when nothing succeeded; the body always
/// carries the per-id breakdown.
pub async fn bulk_action_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BulkActionRequest>,
) -> AppResult<(StatusCode, Json<BulkActionResult>)> {
    let actor = Actor::from_headers(&headers);
    let result = state
        .archive()
        .bulk_action(&request, &actor.audit_name())
        .await?;

    let status = match result.outcome() {
        BulkOutcome::AllSucceeded => StatusCode::OK,
        BulkOutcome::Partial => StatusCode::PARTIAL_CONTENT,
        BulkOutcome::AllFailed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Ok((status, Json(result)))
}

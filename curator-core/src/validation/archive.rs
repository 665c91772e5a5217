use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::StoreTimeouts,
    database::{
        bounded,
        ports::{AuditEvent, AuditLog, CatalogRepository, ValidationUpdate},
    },
    error::{CurationError, Result},
    time::Clock,
    types::{CatalogItem, ContentType, ParseEnumError, ValidationStatus},
};

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedCounts {
    pub channels: u64,
    pub playlists: u64,
    pub videos: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedPage {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub items: Vec<CatalogItem>,
    pub limit: usize,
    /// More archived items exist beyond `limit`.
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkAction {
    Delete,
    Restore,
}

impl BulkAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Restore => "RESTORE",
        }
    }

    const fn past_tense(self) -> &'static str {
        match self {
            Self::Delete => "deleted",
            Self::Restore => "restored",
        }
    }
}

impl FromStr for BulkAction {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DELETE" => Ok(Self::Delete),
            "RESTORE" => Ok(Self::Restore),
            _ => Err(ParseEnumError::new("bulk action", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionRequest {
    pub action: BulkAction,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub ids: Vec<Uuid>,
}

/// How a bulk action went overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOutcome {
    AllSucceeded,
    Partial,
    AllFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkActionResult {
    pub action: BulkAction,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub message: String,
}

impl BulkActionResult {
    pub fn outcome(&self) -> BulkOutcome {
        match (self.success_count, self.failed_count) {
            (_, 0) => BulkOutcome::AllSucceeded,
            (0, _) => BulkOutcome::AllFailed,
            _ => BulkOutcome::Partial,
        }
    }
}

/// Listing and bulk handling of archived catalog items.
pub struct ArchiveService {
    catalog: Arc<dyn CatalogRepository>,
    audit: Arc<dyn AuditLog>,
    timeouts: StoreTimeouts,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ArchiveService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveService")
            .field("catalog", &std::any::type_name_of_val(self.catalog.as_ref()))
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl ArchiveService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        audit: Arc<dyn AuditLog>,
        timeouts: StoreTimeouts,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            audit,
            timeouts,
            clock,
        }
    }

    pub async fn counts(&self) -> Result<ArchivedCounts> {
        let mut counts = ArchivedCounts::default();
        for content_type in ContentType::ALL {
            let count = bounded(
                self.timeouts.bulk_query(),
                "archived count",
                self.catalog.count_archived(content_type),
            )
            .await?;
            match content_type {
                ContentType::Channel => counts.channels = count,
                ContentType::Playlist => counts.playlists = count,
                ContentType::Video => counts.videos = count,
            }
            counts.total += count;
        }
        Ok(counts)
    }

    pub async fn list(&self, content_type: ContentType, limit: usize) -> Result<ArchivedPage> {
        if !(1..=MAX_LIST_LIMIT).contains(&limit) {
            return Err(CurationError::InvalidInput(format!(
                "limit must be between 1 and {MAX_LIST_LIMIT}"
            )));
        }

        let mut items = bounded(
            self.timeouts.bulk_query(),
            "archived listing",
            self.catalog.list_archived(content_type, limit + 1),
        )
        .await?;
        let truncated = items.len() > limit;
        items.truncate(limit);

        Ok(ArchivedPage {
            content_type,
            items,
            limit,
            truncated,
        })
    }

    /// Apply `request.action` to every id independently. Per-id failures are
    /// collected, never short-circuit the rest.
    pub async fn bulk_action(
        &self,
        request: &BulkActionRequest,
        actor: &str,
    ) -> Result<BulkActionResult> {
        if request.ids.is_empty() {
            return Err(CurationError::InvalidInput("ids must not be empty".into()));
        }

        let content_type = request.content_type;
        let mut success_count = 0;
        let mut errors = Vec::new();

        for id in &request.ids {
            match self.apply(request.action, content_type, *id).await {
                Ok(true) => {
                    success_count += 1;
                    self.audit(request.action, content_type, *id, actor).await;
                }
                Ok(false) => errors.push(format!("{id}: not found")),
                Err(err) => {
                    warn!(
                        item_id = %id,
                        error = %err,
                        action = request.action.as_str(),
                        "bulk action failed for item"
                    );
                    errors.push(format!("{id}: {err}"));
                }
            }
        }

        let failed_count = errors.len();
        let message = format!(
            "{} {success_count} of {} {}",
            capitalize(request.action.past_tense()),
            request.ids.len(),
            content_type.plural()
        );
        info!(
            action = request.action.as_str(),
            content_type = %content_type,
            success_count,
            failed_count,
            actor,
            "bulk archive action finished"
        );

        Ok(BulkActionResult {
            action: request.action,
            content_type,
            success_count,
            failed_count,
            errors,
            message,
        })
    }

    async fn apply(&self, action: BulkAction, content_type: ContentType, id: Uuid) -> Result<bool> {
        match action {
            BulkAction::Delete => {
                bounded(
                    self.timeouts.write(),
                    "archived delete",
                    self.catalog.delete(content_type, id),
                )
                .await
            }
            BulkAction::Restore => {
                let update = ValidationUpdate {
                    status: ValidationStatus::Valid,
                    validated_at: self.clock.now(),
                    title: None,
                };
                bounded(
                    self.timeouts.write(),
                    "archived restore",
                    self.catalog.record_validation(content_type, id, &update),
                )
                .await
            }
        }
    }

    async fn audit(&self, action: BulkAction, content_type: ContentType, id: Uuid, actor: &str) {
        let event = AuditEvent::new(
            format!("{}_{}", content_type.as_str(), action.past_tense()),
            content_type.as_str(),
            id.to_string(),
            actor,
            self.clock.now(),
        );
        if let Err(err) = self.audit.record(event).await {
            warn!(item_id = %id, error = %err, "failed to record bulk action audit event");
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

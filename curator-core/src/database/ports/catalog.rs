use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::Result,
    types::{CatalogItem, ContentType, ValidationStatus},
};

/// Fields the validation core is allowed to write on a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationUpdate {
    pub status: ValidationStatus,
    pub validated_at: DateTime<Utc>,
    /// Refreshed title; `None` leaves the stored title untouched.
    pub title: Option<String>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Items that are not archived and were never validated or last validated
    /// before `stale_before`. Never-validated first, then oldest first.
    async fn due_for_validation(
        &self,
        content_type: ContentType,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CatalogItem>>;

    /// Returns false when the item does not exist.
    async fn record_validation(
        &self,
        content_type: ContentType,
        id: Uuid,
        update: &ValidationUpdate,
    ) -> Result<bool>;

    /// Archived (including legacy unavailable) items, most recently validated first.
    async fn list_archived(
        &self,
        content_type: ContentType,
        limit: usize,
    ) -> Result<Vec<CatalogItem>>;

    async fn count_archived(&self, content_type: ContentType) -> Result<u64>;

    /// Returns false when the item does not exist.
    async fn delete(&self, content_type: ContentType, id: Uuid) -> Result<bool>;

    /// Insert or replace an item. Used by imports and fixtures.
    async fn upsert(&self, item: &CatalogItem) -> Result<()>;
}

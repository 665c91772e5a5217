use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    database::ports::{CatalogRepository, ValidationUpdate},
    error::{CurationError, Result},
    types::{CatalogItem, ContentType},
};

#[derive(Debug, Clone)]
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    id: Uuid,
    content_type: String,
    external_id: String,
    title: Option<String>,
    validation_status: String,
    last_validated_at: Option<DateTime<Utc>>,
}

impl TryFrom<CatalogRow> for CatalogItem {
    type Error = CurationError;

    fn try_from(row: CatalogRow) -> Result<Self> {
        let invalid = |e: crate::types::ParseEnumError| {
            CurationError::Store(format!("Corrupt catalog item {}: {e}", row.id))
        };

        Ok(Self {
            id: row.id,
            content_type: row.content_type.parse().map_err(invalid)?,
            external_id: row.external_id,
            title: row.title,
            validation_status: row.validation_status.parse().map_err(invalid)?,
            last_validated_at: row.last_validated_at,
        })
    }
}

fn collect(rows: Vec<CatalogRow>) -> Result<Vec<CatalogItem>> {
    rows.into_iter().map(CatalogItem::try_from).collect()
}

fn as_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn due_for_validation(
        &self,
        content_type: ContentType,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r#"
            SELECT id, content_type, external_id, title, validation_status, last_validated_at
            FROM catalog_items
            WHERE content_type = $1
              AND validation_status NOT IN ('ARCHIVED', 'UNAVAILABLE')
              AND (last_validated_at IS NULL OR last_validated_at < $2)
            ORDER BY last_validated_at ASC NULLS FIRST, id
            LIMIT $3
            "#,
        )
        .bind(content_type.as_str())
        .bind(stale_before)
        .bind(as_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!(
                "Failed to select {} due for validation: {e}",
                content_type.plural()
            ))
        })?;

        collect(rows)
    }

    async fn record_validation(
        &self,
        content_type: ContentType,
        id: Uuid,
        update: &ValidationUpdate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_items
            SET validation_status = $3,
                last_validated_at = $4,
                title = COALESCE($5, title)
            WHERE id = $1 AND content_type = $2
            "#,
        )
        .bind(id)
        .bind(content_type.as_str())
        .bind(update.status.as_str())
        .bind(update.validated_at)
        .bind(update.title.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to record validation for {id}: {e}"))
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_archived(
        &self,
        content_type: ContentType,
        limit: usize,
    ) -> Result<Vec<CatalogItem>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r#"
            SELECT id, content_type, external_id, title, validation_status, last_validated_at
            FROM catalog_items
            WHERE content_type = $1
              AND validation_status IN ('ARCHIVED', 'UNAVAILABLE')
            ORDER BY last_validated_at DESC NULLS LAST, id DESC
            LIMIT $2
            "#,
        )
        .bind(content_type.as_str())
        .bind(as_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to list archived {}: {e}", content_type.plural()))
        })?;

        collect(rows)
    }

    async fn count_archived(&self, content_type: ContentType) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM catalog_items
            WHERE content_type = $1
              AND validation_status IN ('ARCHIVED', 'UNAVAILABLE')
            "#,
        )
        .bind(content_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to count archived {}: {e}", content_type.plural()))
        })?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete(&self, content_type: ContentType, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog_items WHERE id = $1 AND content_type = $2")
            .bind(id)
            .bind(content_type.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CurationError::Store(format!("Failed to delete catalog item {id}: {e}"))
            })?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert(&self, item: &CatalogItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, content_type, external_id, title, validation_status, last_validated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET content_type = EXCLUDED.content_type,
                external_id = EXCLUDED.external_id,
                title = EXCLUDED.title,
                validation_status = EXCLUDED.validation_status,
                last_validated_at = EXCLUDED.last_validated_at
            "#,
        )
        .bind(item.id)
        .bind(item.content_type.as_str())
        .bind(&item.external_id)
        .bind(item.title.as_deref())
        .bind(item.validation_status.as_str())
        .bind(item.last_validated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CurationError::Store(format!("Failed to upsert catalog item {}: {e}", item.id))
        })?;

        Ok(())
    }
}

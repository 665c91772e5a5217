use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    /// e.g. `video_auto_archived`, `channel_restored`, `circuit_breaker_reset`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        actor: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            actor: actor.into(),
            occurred_at,
        }
    }
}

/// Best-effort audit trail. Callers log and continue when recording fails.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

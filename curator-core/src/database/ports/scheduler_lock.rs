use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// The single row backing the scheduler lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerLockRecord {
    pub resource_id: String,
    /// Instance identity of the holder.
    pub locked_by: String,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub run_id: Uuid,
}

impl SchedulerLockRecord {
    /// A lock is valid iff `now < expires_at`.
    pub fn is_held_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[async_trait]
pub trait SchedulerLockRepository: Send + Sync {
    /// In one atomic read-modify-write: install `candidate` when no record
    /// exists or the existing one is expired at `now`, replacing every field.
    /// Returns false, without mutating anything, while an unexpired lock exists.
    async fn acquire_if_free(
        &self,
        candidate: &SchedulerLockRecord,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete the record only if it is held by `locked_by` for `run_id`.
    /// Returns whether a record was removed.
    async fn release_if_owner(
        &self,
        resource_id: &str,
        locked_by: &str,
        run_id: Uuid,
    ) -> Result<bool>;

    /// Current record, expired or not.
    async fn current(&self, resource_id: &str) -> Result<Option<SchedulerLockRecord>>;
}

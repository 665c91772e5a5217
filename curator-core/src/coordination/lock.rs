use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::{SchedulerLockConfig, StoreTimeouts},
    database::{
        bounded,
        ports::{SchedulerLockRecord, SchedulerLockRepository},
    },
    error::Result,
    time::Clock,
};

/// Cluster-wide mutual exclusion for validation runs.
///
/// Backed by a single store row. Acquisition fails closed: if the store
/// cannot be reached in time the lock is reported as not acquired.
pub struct SchedulerLockService {
    store: Arc<dyn SchedulerLockRepository>,
    config: SchedulerLockConfig,
    timeouts: StoreTimeouts,
    clock: Arc<dyn Clock>,
    instance_id: String,
}

impl fmt::Debug for SchedulerLockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerLockService")
            .field("resource_id", &self.config.resource_id)
            .field("instance_id", &self.instance_id)
            .field("ttl_minutes", &self.config.lock_ttl_minutes)
            .finish()
    }
}

impl SchedulerLockService {
    pub fn new(
        store: Arc<dyn SchedulerLockRepository>,
        config: SchedulerLockConfig,
        timeouts: StoreTimeouts,
        clock: Arc<dyn Clock>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            config,
            timeouts,
            clock,
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Take the lock for `run_id` if it is free or expired.
    pub async fn try_acquire(&self, run_id: Uuid) -> bool {
        let now = self.clock.now();
        let candidate = SchedulerLockRecord {
            resource_id: self.config.resource_id.clone(),
            locked_by: self.instance_id.clone(),
            locked_at: now,
            expires_at: now + self.config.ttl(),
            run_id,
        };

        match bounded(
            self.timeouts.write(),
            "scheduler lock acquire",
            self.store.acquire_if_free(&candidate, now),
        )
        .await
        {
            Ok(true) => {
                info!(
                    run_id = %run_id,
                    instance = %self.instance_id,
                    expires_at = %candidate.expires_at,
                    "scheduler lock acquired"
                );
                true
            }
            Ok(false) => {
                debug!(run_id = %run_id, "scheduler lock held by another run");
                false
            }
            Err(err) => {
                warn!(
                    run_id = %run_id,
                    error = %err,
                    "scheduler lock store unavailable; not acquired"
                );
                false
            }
        }
    }

    /// Drop the lock if this instance still holds it for `run_id`. A lock that
    /// expired and was reclaimed by someone else is left alone.
    pub async fn release(&self, run_id: Uuid) {
        match bounded(
            self.timeouts.write(),
            "scheduler lock release",
            self.store
                .release_if_owner(&self.config.resource_id, &self.instance_id, run_id),
        )
        .await
        {
            Ok(true) => info!(run_id = %run_id, "scheduler lock released"),
            Ok(false) => debug!(
                run_id = %run_id,
                "scheduler lock not owned by this run; nothing released"
            ),
            Err(err) => warn!(
                run_id = %run_id,
                error = %err,
                "failed to release scheduler lock; it will expire on its own"
            ),
        }
    }

    /// The current holder, or `None` when the lock is free or expired.
    pub async fn status(&self) -> Result<Option<SchedulerLockRecord>> {
        let record = bounded(
            self.timeouts.read(),
            "scheduler lock status",
            self.store.current(&self.config.resource_id),
        )
        .await?;
        let now = self.clock.now();
        Ok(record.filter(|lock| lock.is_held_at(now)))
    }
}

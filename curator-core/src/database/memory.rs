//! In-process adapters for every port.
//!
//! Same contracts as the Postgres repositories (conditional lock acquire,
//! version-checked breaker writes) behind `tokio::sync::Mutex`. Used by the
//! `--in-memory` server mode and throughout the tests.

use std::{
    cmp::Reverse,
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ports::{
    AuditEvent, AuditLog, CatalogRepository, CircuitBreakerRepository,
    SchedulerLockRecord, SchedulerLockRepository, ValidationRunRepository,
    ValidationUpdate,
};
use crate::{
    coordination::breaker::CircuitBreakerState,
    error::{CurationError, Result},
    types::{CatalogItem, ContentType},
    validation::run::ValidationRun,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    unavailable: AtomicBool,
    locks: Mutex<HashMap<String, SchedulerLockRecord>>,
    breakers: Mutex<HashMap<String, CircuitBreakerState>>,
    runs: Mutex<HashMap<Uuid, ValidationRun>>,
    catalog: Mutex<HashMap<Uuid, CatalogItem>>,
    audit: Mutex<Vec<AuditEvent>>,
}

pub type InMemorySchedulerLockRepository = InMemoryStore;
pub type InMemoryCircuitBreakerRepository = InMemoryStore;

impl InMemoryStore {
    /// While set, every call fails as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CurationError::Store("in-memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    pub async fn item(&self, id: Uuid) -> Option<CatalogItem> {
        self.catalog.lock().await.get(&id).cloned()
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit.lock().await.clone()
    }
}

#[async_trait]
impl SchedulerLockRepository for InMemoryStore {
    async fn acquire_if_free(
        &self,
        candidate: &SchedulerLockRecord,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.check()?;
        let mut locks = self.locks.lock().await;
        if locks
            .get(&candidate.resource_id)
            .is_some_and(|held| held.is_held_at(now))
        {
            return Ok(false);
        }
        locks.insert(candidate.resource_id.clone(), candidate.clone());
        Ok(true)
    }

    async fn release_if_owner(
        &self,
        resource_id: &str,
        locked_by: &str,
        run_id: Uuid,
    ) -> Result<bool> {
        self.check()?;
        let mut locks = self.locks.lock().await;
        let owned = locks
            .get(resource_id)
            .is_some_and(|held| held.locked_by == locked_by && held.run_id == run_id);
        if owned {
            locks.remove(resource_id);
        }
        Ok(owned)
    }

    async fn current(&self, resource_id: &str) -> Result<Option<SchedulerLockRecord>> {
        self.check()?;
        Ok(self.locks.lock().await.get(resource_id).cloned())
    }
}

#[async_trait]
impl CircuitBreakerRepository for InMemoryStore {
    async fn load(&self, resource_id: &str) -> Result<Option<CircuitBreakerState>> {
        self.check()?;
        Ok(self.breakers.lock().await.get(resource_id).cloned())
    }

    async fn compare_and_set(
        &self,
        resource_id: &str,
        expected_version: i64,
        next: &CircuitBreakerState,
    ) -> Result<bool> {
        self.check()?;
        let mut breakers = self.breakers.lock().await;
        let stored_version = breakers.get(resource_id).map_or(0, |state| state.version);
        if stored_version != expected_version {
            return Ok(false);
        }
        breakers.insert(resource_id.to_string(), next.clone());
        Ok(true)
    }
}

#[async_trait]
impl ValidationRunRepository for InMemoryStore {
    async fn save(&self, run: &ValidationRun) -> Result<()> {
        self.check()?;
        self.runs.lock().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ValidationRun>> {
        self.check()?;
        Ok(self.runs.lock().await.get(&id).cloned())
    }

    async fn latest(&self) -> Result<Option<ValidationRun>> {
        Ok(self.history(1).await?.into_iter().next())
    }

    async fn history(&self, limit: usize) -> Result<Vec<ValidationRun>> {
        self.check()?;
        let mut runs: Vec<ValidationRun> = self.runs.lock().await.values().cloned().collect();
        runs.sort_by_key(|run| Reverse((run.started_at, run.id)));
        runs.truncate(limit);
        Ok(runs)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn due_for_validation(
        &self,
        content_type: ContentType,
        stale_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CatalogItem>> {
        self.check()?;
        let mut due: Vec<CatalogItem> = self
            .catalog
            .lock()
            .await
            .values()
            .filter(|item| item.content_type == content_type && item.is_due(stale_before))
            .cloned()
            .collect();
        // `None < Some(_)`, so never-validated items sort first.
        due.sort_by_key(|item| (item.last_validated_at, item.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn record_validation(
        &self,
        content_type: ContentType,
        id: Uuid,
        update: &ValidationUpdate,
    ) -> Result<bool> {
        self.check()?;
        let mut catalog = self.catalog.lock().await;
        match catalog.get_mut(&id) {
            Some(item) if item.content_type == content_type => {
                item.validation_status = update.status;
                item.last_validated_at = Some(update.validated_at);
                if let Some(title) = &update.title {
                    item.title = Some(title.clone());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_archived(
        &self,
        content_type: ContentType,
        limit: usize,
    ) -> Result<Vec<CatalogItem>> {
        self.check()?;
        let mut archived: Vec<CatalogItem> = self
            .catalog
            .lock()
            .await
            .values()
            .filter(|item| {
                item.content_type == content_type && item.validation_status.is_archived()
            })
            .cloned()
            .collect();
        archived.sort_by_key(|item| Reverse((item.last_validated_at, item.id)));
        archived.truncate(limit);
        Ok(archived)
    }

    async fn count_archived(&self, content_type: ContentType) -> Result<u64> {
        self.check()?;
        let count = self
            .catalog
            .lock()
            .await
            .values()
            .filter(|item| {
                item.content_type == content_type && item.validation_status.is_archived()
            })
            .count();
        Ok(count as u64)
    }

    async fn delete(&self, content_type: ContentType, id: Uuid) -> Result<bool> {
        self.check()?;
        let mut catalog = self.catalog.lock().await;
        if catalog
            .get(&id)
            .is_some_and(|item| item.content_type == content_type)
        {
            catalog.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn upsert(&self, item: &CatalogItem) -> Result<()> {
        self.check()?;
        self.catalog.lock().await.insert(item.id, item.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditLog for InMemoryStore {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        self.check()?;
        self.audit.lock().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::types::ValidationStatus;

    #[tokio::test]
    async fn compare_and_set_rejects_stale_versions() {
        let store = InMemoryStore::default();
        let first = CircuitBreakerState {
            version: 1,
            ..CircuitBreakerState::default()
        };

        assert!(store.compare_and_set("breaker", 0, &first).await.unwrap());
        assert!(!store.compare_and_set("breaker", 0, &first).await.unwrap());

        let second = CircuitBreakerState {
            version: 2,
            ..first.clone()
        };
        assert!(store.compare_and_set("breaker", 1, &second).await.unwrap());
        assert_eq!(store.load("breaker").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn due_items_come_never_validated_first_then_oldest() {
        let store = InMemoryStore::default();
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let old = CatalogItem::new(ContentType::Video, "old")
            .with_status(ValidationStatus::Valid, Some(now - Duration::hours(30)));
        let older = CatalogItem::new(ContentType::Video, "older")
            .with_status(ValidationStatus::Error, Some(now - Duration::hours(50)));
        let never = CatalogItem::new(ContentType::Video, "never");
        let channel = CatalogItem::new(ContentType::Channel, "other-type");
        for item in [&old, &older, &never, &channel] {
            store.upsert(item).await.unwrap();
        }

        let due = store
            .due_for_validation(ContentType::Video, now - Duration::hours(24), 10)
            .await
            .unwrap();
        let order: Vec<&str> = due.iter().map(|item| item.external_id.as_str()).collect();

        assert_eq!(order, vec!["never", "older", "old"]);
    }
}

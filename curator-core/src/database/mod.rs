pub mod memory;
pub mod ports;

#[cfg(feature = "database")]
pub mod postgres;
#[cfg(feature = "database")]
pub mod repositories;

#[cfg(feature = "database")]
pub use postgres::{PoolStats, PostgresDatabase};

use std::{future::Future, sync::Arc, time::Duration};

use crate::error::{CurationError, Result};
use ports::{
    AuditLog, CatalogRepository, CircuitBreakerRepository, SchedulerLockRepository,
    ValidationRunRepository,
};

/// Run a store call under a time budget; expiry becomes
/// [`CurationError::Timeout`] so callers can apply their fail-safe policy.
pub async fn bounded<T, F>(budget: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(CurationError::Timeout { operation }),
    }
}

/// One handle per port, all pointing at the same backing store.
#[derive(Clone)]
pub struct CurationStores {
    pub locks: Arc<dyn SchedulerLockRepository>,
    pub breaker: Arc<dyn CircuitBreakerRepository>,
    pub runs: Arc<dyn ValidationRunRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub audit: Arc<dyn AuditLog>,
}

impl std::fmt::Debug for CurationStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurationStores")
            .field("locks", &std::any::type_name_of_val(self.locks.as_ref()))
            .field("catalog", &std::any::type_name_of_val(self.catalog.as_ref()))
            .finish_non_exhaustive()
    }
}

impl CurationStores {
    /// Everything backed by a single in-process store.
    pub fn in_memory() -> (Self, Arc<memory::InMemoryStore>) {
        let store = Arc::new(memory::InMemoryStore::default());
        let stores = Self {
            locks: store.clone(),
            breaker: store.clone(),
            runs: store.clone(),
            catalog: store.clone(),
            audit: store.clone(),
        };
        (stores, store)
    }

    #[cfg(feature = "database")]
    pub fn postgres(db: &PostgresDatabase) -> Self {
        Self {
            locks: Arc::new(db.scheduler_lock_repository()),
            breaker: Arc::new(db.circuit_breaker_repository()),
            runs: Arc::new(db.validation_run_repository()),
            catalog: Arc::new(db.catalog_repository()),
            audit: Arc::new(db.audit_repository()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_turns_a_slow_call_into_a_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, CurationError>(())
        };

        let err = bounded(Duration::from_secs(1), "slow read", slow)
            .await
            .unwrap_err();

        assert!(matches!(err, CurationError::Timeout { operation: "slow read" }));
        assert!(err.is_store_unavailable());
    }
}

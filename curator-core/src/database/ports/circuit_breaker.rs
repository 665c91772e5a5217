use async_trait::async_trait;

use crate::{coordination::breaker::CircuitBreakerState, error::Result};

#[async_trait]
pub trait CircuitBreakerRepository: Send + Sync {
    /// Current shared state, `None` before the first write.
    async fn load(&self, resource_id: &str) -> Result<Option<CircuitBreakerState>>;

    /// Persist `next` only if the stored version still equals
    /// `expected_version` (0 means "no record yet"). `next.version` is the
    /// new version and must be `expected_version + 1`.
    ///
    /// Returns false on a version mismatch; the caller re-reads and retries.
    async fn compare_and_set(
        &self,
        resource_id: &str,
        expected_version: i64,
        next: &CircuitBreakerState,
    ) -> Result<bool>;
}

use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::Result, validation::run::ValidationRun};

#[async_trait]
pub trait ValidationRunRepository: Send + Sync {
    /// Insert or fully overwrite the run record.
    async fn save(&self, run: &ValidationRun) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<ValidationRun>>;

    /// Most recently started run.
    async fn latest(&self) -> Result<Option<ValidationRun>>;

    /// Runs ordered newest first.
    async fn history(&self, limit: usize) -> Result<Vec<ValidationRun>>;
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CurationError {
    /// The coordination or catalog store rejected or failed an operation.
    #[error("Store error: {0}")]
    Store(String),

    /// A store call exceeded its configured read/write budget.
    #[error("Store operation timed out: {operation}")]
    Timeout { operation: &'static str },

    /// Optimistic concurrency retries were exhausted, or an exclusive resource is held.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CurationError {
    /// True for failures of the backing store itself (unreachable, slow, conflicting),
    /// as opposed to domain-level outcomes.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Timeout { .. } | Self::Conflict(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CurationError>;

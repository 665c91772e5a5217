//! Contract with the external metadata service.
//!
//! [`MetadataGateway`] answers for a single id. [`ContentValidator`] is what
//! the orchestrator calls: one batch in, one [`ItemOutcome`] per id out.
//! [`GuardedGateway`] is the production validator, routing every lookup
//! through the throttler and the circuit breaker.

pub mod guarded;
pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ContentType, ItemDetails, ValidationStatus};

pub use guarded::GuardedGateway;
pub use http::{HttpGatewayConfig, HttpMetadataGateway};

/// A failed lookup, optionally wrapping the failure that caused it.
///
/// `kind` is the upstream error type name (`SignInConfirmNotBot`, `Timeout`,
/// `Http503`, ...). The breaker classifier inspects `kind` and `message` of
/// every link in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct GatewayFailure {
    pub kind: String,
    pub message: String,
    #[source]
    cause: Option<Box<GatewayFailure>>,
}

impl GatewayFailure {
    pub const BREAKER_OPEN: &'static str = "CircuitBreakerOpen";
    pub const TIMEOUT: &'static str = "Timeout";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn caused_by(mut self, cause: GatewayFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The request never left this process because the breaker is open.
    pub fn breaker_open() -> Self {
        Self::new(
            Self::BREAKER_OPEN,
            "request blocked by the metadata gateway circuit breaker",
        )
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            Self::TIMEOUT,
            format!("lookup timed out after {}ms", after.as_millis()),
        )
    }

    pub fn is_breaker_rejection(&self) -> bool {
        self.kind == Self::BREAKER_OPEN
    }

    /// This failure followed by each nested cause.
    pub fn chain(&self) -> impl Iterator<Item = &GatewayFailure> {
        std::iter::successors(Some(self), |failure| failure.cause.as_deref())
    }
}

/// Per-id answer of a [`MetadataGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Upstream positively confirmed the item is gone.
    #[error("item not found upstream")]
    NotFound,
    #[error(transparent)]
    Failed(#[from] GatewayFailure),
}

/// Single-item metadata lookup against the external platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataGateway: Send + Sync {
    async fn lookup(
        &self,
        content_type: ContentType,
        external_id: &str,
    ) -> Result<ItemDetails, LookupError>;
}

/// Classification of one checked item.
///
/// Only [`ItemOutcome::NotFound`] leads to archival. Every failure mode,
/// including breaker rejections and rate limiting, is an `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Valid(ItemDetails),
    NotFound,
    Error(GatewayFailure),
}

impl ItemOutcome {
    pub fn resulting_status(&self) -> ValidationStatus {
        match self {
            Self::Valid(_) => ValidationStatus::Valid,
            Self::NotFound => ValidationStatus::Archived,
            Self::Error(_) => ValidationStatus::Error,
        }
    }
}

impl From<Result<ItemDetails, LookupError>> for ItemOutcome {
    fn from(result: Result<ItemDetails, LookupError>) -> Self {
        match result {
            Ok(details) => Self::Valid(details),
            Err(LookupError::NotFound) => Self::NotFound,
            Err(LookupError::Failed(failure)) => Self::Error(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCheck {
    pub external_id: String,
    pub outcome: ItemOutcome,
}

/// Outcomes for one batch, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchValidation {
    pub checks: Vec<ItemCheck>,
}

impl BatchValidation {
    pub fn push(&mut self, external_id: impl Into<String>, outcome: ItemOutcome) {
        self.checks.push(ItemCheck {
            external_id: external_id.into(),
            outcome,
        });
    }

    pub fn outcome_for(&self, external_id: &str) -> Option<&ItemOutcome> {
        self.checks
            .iter()
            .find(|check| check.external_id == external_id)
            .map(|check| &check.outcome)
    }
}

#[async_trait]
pub trait ContentValidator: Send + Sync {
    /// Never fails as a whole; per-item failures are reported as
    /// [`ItemOutcome::Error`].
    async fn validate_batch(
        &self,
        content_type: ContentType,
        external_ids: &[String],
    ) -> BatchValidation;
}

//! PostgreSQL-backed repository implementations.

pub mod audit;
pub mod catalog;
pub mod circuit_breaker;
pub mod scheduler_lock;
pub mod validation_runs;

pub use audit::PostgresAuditRepository;
pub use catalog::PostgresCatalogRepository;
pub use circuit_breaker::PostgresCircuitBreakerRepository;
pub use scheduler_lock::PostgresSchedulerLockRepository;
pub use validation_runs::PostgresValidationRunRepository;

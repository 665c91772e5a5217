//! Repository ports (interfaces) for the validation core.
//!
//! Services depend on these traits only. Postgres adapters live in
//! `database::repositories`, in-memory adapters in `database::memory`.

pub mod audit;
pub mod catalog;
pub mod circuit_breaker;
pub mod scheduler_lock;
pub mod validation_runs;

pub use audit::{AuditEvent, AuditLog};
pub use catalog::{CatalogRepository, ValidationUpdate};
pub use circuit_breaker::CircuitBreakerRepository;
pub use scheduler_lock::{SchedulerLockRecord, SchedulerLockRepository};
pub use validation_runs::ValidationRunRepository;

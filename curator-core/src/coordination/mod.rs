//! Cross-instance coordination: the scheduler lock and the circuit breaker
//! share state through the store; the throttler is per process.

pub mod breaker;
pub mod lock;
pub mod throttle;

pub use breaker::{
    AllowDecision, CircuitBreakerService, CircuitBreakerState, CircuitBreakerStatus,
    CircuitState, ProbeStatus, RateLimitClassifier,
};
pub use lock::SchedulerLockService;
pub use throttle::Throttler;

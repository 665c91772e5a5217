mod classifier;
mod service;
mod state;

pub use classifier::RateLimitClassifier;
pub use service::{AllowDecision, CircuitBreakerService};
pub use state::{CircuitBreakerState, CircuitBreakerStatus, CircuitState, ProbeStatus};

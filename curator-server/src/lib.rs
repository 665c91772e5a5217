//! # Curator Server
//!
//! HTTP front end and background scheduling for content validation.
//!
//! - Admin endpoints under `/api/admin/content-validation` to trigger runs,
//!   follow their progress and manage archived content
//! - A worker pool that executes asynchronously triggered runs
//! - A periodic scheduler gated by the circuit breaker and scheduler lock

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;

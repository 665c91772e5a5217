//! # Curator Core
//!
//! Safe periodic re-validation of curated content against a rate-limit
//! sensitive metadata service, from any number of backend instances.
//!
//! ## Overview
//!
//! - **Scheduler lock**: one validation run across the cluster at a time,
//!   recovered through expiry when a holder crashes
//! - **Circuit breaker**: persisted, version-guarded breaker with single-probe
//!   recovery and exponential cooldown backoff
//! - **Throttler**: per-process pacing of outbound calls
//! - **Validation runs**: stale-item selection, batch checks and the archival
//!   policy where only a confirmed not-found archives an item
//! - **Archive management**: listing, counting, bulk restore and delete
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL repositories and embedded migrations (SQLx)
//! - `e2e`: Postgres-backed adapter tests; needs `DATABASE_URL`
//!
//! ## Architecture
//!
//! - [`coordination`]: lock, breaker and throttler
//! - [`gateway`]: the metadata service contract and its guarded adapter
//! - [`validation`]: orchestrator, run records and archived content
//! - [`database`]: ports with Postgres and in-memory adapters
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use curator_core::{
//!     config::CurationConfig,
//!     coordination::{CircuitBreakerService, SchedulerLockService, Throttler},
//!     database::CurationStores,
//!     gateway::{GuardedGateway, HttpGatewayConfig, HttpMetadataGateway},
//!     time::SystemClock,
//!     validation::{RunRequest, RunScope, TriggerType, ValidationService},
//! };
//!
//! async fn validate_once() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CurationConfig::default();
//!     let (stores, _) = CurationStores::in_memory();
//!     let clock = Arc::new(SystemClock);
//!
//!     let breaker = Arc::new(CircuitBreakerService::new(
//!         stores.breaker.clone(),
//!         config.circuit_breaker.clone(),
//!         config.timeouts,
//!         clock.clone(),
//!     ));
//!     let gateway = GuardedGateway::new(
//!         Arc::new(HttpMetadataGateway::new(&HttpGatewayConfig::default())?),
//!         breaker,
//!         Arc::new(Throttler::new(config.throttle.clone())),
//!         std::time::Duration::from_secs(15),
//!     );
//!     let lock = SchedulerLockService::new(
//!         stores.locks.clone(),
//!         config.lock.clone(),
//!         config.timeouts,
//!         clock.clone(),
//!         curator_core::instance::instance_id(),
//!     );
//!     let service = ValidationService::new(
//!         Arc::new(lock),
//!         Arc::new(gateway),
//!         stores.catalog,
//!         stores.runs,
//!         stores.audit,
//!         config.validation,
//!         config.timeouts,
//!         clock,
//!     );
//!
//!     let run = service
//!         .run_now(RunRequest::new(RunScope::All, TriggerType::Manual))
//!         .await?;
//!     println!("{} items archived", run.counters.total_archived());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Tunables for the lock, breaker, throttler and validation passes
pub mod config;

/// Scheduler lock, circuit breaker and throttler
pub mod coordination;

/// Ports and adapters for every persisted record
pub mod database;

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Error types and error handling utilities
pub mod error;

/// Metadata service contract, guarded validator and HTTP adapter
pub mod gateway;

/// Identity of this process within the cluster
pub mod instance;

/// Injectable wall clock
pub mod time;

/// Catalog-facing types
pub mod types;

/// Validation runs, orchestration and archived-content management
pub mod validation;

pub use error::{CurationError, Result};

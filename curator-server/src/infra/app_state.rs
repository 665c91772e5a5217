use std::{fmt, sync::Arc};

use curator_core::{
    coordination::{CircuitBreakerService, SchedulerLockService, Throttler},
    database::{CurationStores, PostgresDatabase, ports::AuditLog},
    gateway::{GuardedGateway, MetadataGateway},
    time::Clock,
    validation::{ArchiveService, ValidationService},
};

use super::{config::Config, scheduler::ValidationScheduler, workers::ValidationWorkers};

/// Shared handles for request handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    validation: Arc<ValidationService>,
    archive: Arc<ArchiveService>,
    breaker: Arc<CircuitBreakerService>,
    workers: Arc<ValidationWorkers>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    /// `None` when running on the in-memory stores.
    postgres: Option<Arc<PostgresDatabase>>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("breaker", &self.breaker)
            .field("workers", &self.workers)
            .field("postgres", &self.postgres.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the coordination services, the guarded gateway and the worker
    /// pool on top of `stores`. Must be called inside a Tokio runtime.
    pub fn assemble(
        config: Arc<Config>,
        stores: CurationStores,
        gateway: Arc<dyn MetadataGateway>,
        clock: Arc<dyn Clock>,
        instance_id: String,
        postgres: Option<Arc<PostgresDatabase>>,
    ) -> Self {
        let curation = &config.curation;

        let breaker = Arc::new(CircuitBreakerService::new(
            stores.breaker.clone(),
            curation.circuit_breaker.clone(),
            curation.timeouts,
            clock.clone(),
        ));
        let throttler = Arc::new(Throttler::new(curation.throttle.clone()));
        let validator = Arc::new(GuardedGateway::new(
            gateway,
            breaker.clone(),
            throttler,
            config.gateway.call_timeout(),
        ));
        let lock = Arc::new(SchedulerLockService::new(
            stores.locks.clone(),
            curation.lock.clone(),
            curation.timeouts,
            clock.clone(),
            instance_id,
        ));

        let validation = Arc::new(ValidationService::new(
            lock,
            validator,
            stores.catalog.clone(),
            stores.runs.clone(),
            stores.audit.clone(),
            curation.validation.clone(),
            curation.timeouts,
            clock.clone(),
        ));
        let archive = Arc::new(ArchiveService::new(
            stores.catalog.clone(),
            stores.audit.clone(),
            curation.timeouts,
            clock.clone(),
        ));
        let workers = Arc::new(ValidationWorkers::spawn(
            config.workers.clone(),
            validation.clone(),
        ));

        Self {
            config,
            validation,
            archive,
            breaker,
            workers,
            audit: stores.audit,
            clock,
            postgres,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validation(&self) -> &ValidationService {
        &self.validation
    }

    pub fn archive(&self) -> &ArchiveService {
        &self.archive
    }

    pub fn breaker(&self) -> &CircuitBreakerService {
        &self.breaker
    }

    pub fn workers(&self) -> &ValidationWorkers {
        &self.workers
    }

    pub fn audit(&self) -> &dyn AuditLog {
        self.audit.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn postgres(&self) -> Option<&PostgresDatabase> {
        self.postgres.as_deref()
    }

    pub fn scheduler(&self) -> ValidationScheduler {
        ValidationScheduler::new(
            self.config.scheduler.clone(),
            self.validation.clone(),
            self.breaker.clone(),
        )
    }
}

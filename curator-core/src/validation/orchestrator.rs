use std::{fmt, sync::Arc};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::run::{RunPhase, TriggerType, ValidationRun};
use crate::{
    config::{StoreTimeouts, ValidationConfig},
    coordination::lock::SchedulerLockService,
    database::{
        bounded,
        ports::{
            AuditEvent, AuditLog, CatalogRepository, ValidationRunRepository,
            ValidationUpdate,
        },
    },
    error::{CurationError, Result},
    gateway::{ContentValidator, GatewayFailure, ItemOutcome},
    time::Clock,
    types::{CatalogItem, ContentType},
};

pub const MAX_HISTORY_LIMIT: usize = 100;
pub const MAX_ITEMS_PER_TYPE: u32 = 1_000;

/// Which content types a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScope {
    /// Channels, playlists and videos, in that order.
    All,
    Single(ContentType),
}

impl RunScope {
    fn types(self) -> Vec<ContentType> {
        match self {
            Self::All => ContentType::ALL.to_vec(),
            Self::Single(content_type) => vec![content_type],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub scope: RunScope,
    pub trigger: TriggerType,
    /// Item budget; `None` uses the configured default. Split evenly
    /// (rounded up) across types for [`RunScope::All`].
    pub max_items: Option<u32>,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
}

impl RunRequest {
    pub fn new(scope: RunScope, trigger: TriggerType) -> Self {
        Self {
            scope,
            trigger,
            max_items: None,
            actor_id: None,
            actor_name: None,
        }
    }

    pub fn with_max_items(mut self, max_items: Option<u32>) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_actor(mut self, id: Option<String>, name: Option<String>) -> Self {
        self.actor_id = id;
        self.actor_name = name;
        self
    }

    fn validate(&self) -> Result<()> {
        match (self.scope, self.max_items) {
            (_, Some(0)) => Err(CurationError::InvalidInput(
                "maxItems must be at least 1".into(),
            )),
            (RunScope::Single(_), Some(max)) if max > MAX_ITEMS_PER_TYPE => {
                Err(CurationError::InvalidInput(format!(
                    "maxItems must be between 1 and {MAX_ITEMS_PER_TYPE}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn per_type_limit(&self, default: u32) -> usize {
        let budget = self.max_items.unwrap_or(default);
        let limit = match self.scope {
            RunScope::All => budget.div_ceil(ContentType::ALL.len() as u32),
            RunScope::Single(_) => budget,
        };
        limit as usize
    }
}

/// A run that holds the scheduler lock and is persisted as RUNNING, waiting
/// to be executed. Dropping it without [`ValidationService::execute`] or
/// [`ValidationService::abandon`] leaves the lock to expire.
#[must_use = "a pending run holds the scheduler lock"]
#[derive(Debug)]
pub struct PendingRun {
    run: ValidationRun,
    request: RunRequest,
}

impl PendingRun {
    pub fn id(&self) -> Uuid {
        self.run.id
    }

    pub fn run(&self) -> &ValidationRun {
        &self.run
    }
}

/// Drives validation runs: lock, select, check, apply, record.
pub struct ValidationService {
    lock: Arc<SchedulerLockService>,
    validator: Arc<dyn ContentValidator>,
    catalog: Arc<dyn CatalogRepository>,
    runs: Arc<dyn ValidationRunRepository>,
    audit: Arc<dyn AuditLog>,
    config: ValidationConfig,
    timeouts: StoreTimeouts,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for ValidationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationService")
            .field("lock", &self.lock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ValidationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lock: Arc<SchedulerLockService>,
        validator: Arc<dyn ContentValidator>,
        catalog: Arc<dyn CatalogRepository>,
        runs: Arc<dyn ValidationRunRepository>,
        audit: Arc<dyn AuditLog>,
        config: ValidationConfig,
        timeouts: StoreTimeouts,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lock,
            validator,
            catalog,
            runs,
            audit,
            config,
            timeouts,
            clock,
        }
    }

    pub fn lock(&self) -> &SchedulerLockService {
        &self.lock
    }

    /// Take the scheduler lock and persist a RUNNING record.
    ///
    /// Fails with [`CurationError::Conflict`] when another run holds the lock
    /// or the lock store is unreachable.
    pub async fn begin(&self, request: RunRequest) -> Result<PendingRun> {
        request.validate()?;

        let run = ValidationRun::start(
            request.trigger,
            request.actor_id.clone(),
            request.actor_name.clone(),
            self.clock.now(),
        );

        if !self.lock.try_acquire(run.id).await {
            return Err(CurationError::Conflict(
                "a validation run is already in progress".into(),
            ));
        }

        if let Err(err) = self.persist(&run).await {
            self.lock.release(run.id).await;
            return Err(err);
        }

        info!(
            run_id = %run.id,
            trigger = request.trigger.as_str(),
            scope = ?request.scope,
            max_items = ?request.max_items,
            "validation run started"
        );
        Ok(PendingRun { run, request })
    }

    /// Process every type in scope, finalize the record and release the lock.
    /// Failures end up in the returned run, never as an `Err`.
    pub async fn execute(&self, pending: PendingRun) -> ValidationRun {
        let PendingRun { mut run, request } = pending;

        run.enter_phase(RunPhase::Initializing);
        self.save_progress(&run).await;

        match self.process(&mut run, &request).await {
            Ok(()) => run.complete(self.clock.now()),
            Err(err) => {
                error!(run_id = %run.id, error = %err, "validation run failed");
                run.fail(err.to_string(), self.clock.now());
            }
        }

        if let Err(err) = self.persist(&run).await {
            error!(run_id = %run.id, error = %err, "failed to persist final validation run state");
        }
        self.lock.release(run.id).await;

        info!(
            run_id = %run.id,
            status = %run.status,
            checked = run.counters.total_checked(),
            archived = run.counters.total_archived(),
            duration_ms = ?run.duration_ms,
            "validation run finished"
        );
        run
    }

    /// Mark a pending run FAILED without processing it and release the lock.
    pub async fn abandon(&self, pending: PendingRun, reason: &str) -> ValidationRun {
        let PendingRun { mut run, .. } = pending;
        run.fail(reason, self.clock.now());
        if let Err(err) = self.persist(&run).await {
            warn!(run_id = %run.id, error = %err, "failed to persist abandoned validation run");
        }
        self.lock.release(run.id).await;
        warn!(run_id = %run.id, reason, "validation run abandoned");
        run
    }

    /// Finalize a run whose [`Self::execute`] never returned, e.g. because it
    /// panicked. The last persisted progress is marked FAILED with `message`
    /// and the lock is released even when the record cannot be updated.
    pub async fn fail_orphaned(&self, run_id: Uuid, message: &str) -> Result<ValidationRun> {
        let finalized = self.finalize_orphan(run_id, message).await;
        self.lock.release(run_id).await;
        match &finalized {
            Ok(run) => warn!(
                run_id = %run.id,
                status = %run.status,
                message,
                "orphaned validation run finalized"
            ),
            Err(err) => error!(
                run_id = %run_id,
                error = %err,
                "failed to finalize orphaned validation run"
            ),
        }
        finalized
    }

    async fn finalize_orphan(&self, run_id: Uuid, message: &str) -> Result<ValidationRun> {
        let mut run = self.get_run(run_id).await?;
        if run.is_finished() {
            return Ok(run);
        }
        run.fail(message, self.clock.now());
        self.persist(&run).await?;
        Ok(run)
    }

    /// [`Self::begin`] followed by [`Self::execute`] on the caller's task.
    pub async fn run_now(&self, request: RunRequest) -> Result<ValidationRun> {
        let pending = self.begin(request).await?;
        Ok(self.execute(pending).await)
    }

    pub async fn get_run(&self, id: Uuid) -> Result<ValidationRun> {
        bounded(self.timeouts.read(), "validation run lookup", self.runs.get(id))
            .await?
            .ok_or_else(|| CurationError::NotFound(format!("validation run {id}")))
    }

    pub async fn latest_run(&self) -> Result<Option<ValidationRun>> {
        bounded(self.timeouts.read(), "latest validation run", self.runs.latest()).await
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<ValidationRun>> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(CurationError::InvalidInput(format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}"
            )));
        }
        bounded(
            self.timeouts.bulk_query(),
            "validation run history",
            self.runs.history(limit),
        )
        .await
    }

    async fn process(&self, run: &mut ValidationRun, request: &RunRequest) -> Result<()> {
        let limit = request.per_type_limit(self.config.max_items_per_run);
        let actor = request
            .actor_name
            .clone()
            .or_else(|| request.actor_id.clone())
            .unwrap_or_else(|| self.config.system_actor.clone());

        for content_type in request.scope.types() {
            self.process_type(run, content_type, limit, &actor).await?;
        }
        Ok(())
    }

    async fn process_type(
        &self,
        run: &mut ValidationRun,
        content_type: ContentType,
        limit: usize,
        actor: &str,
    ) -> Result<()> {
        let stale_before = self.clock.now() - self.config.staleness();
        let items = bounded(
            self.timeouts.bulk_query(),
            "validation selection",
            self.catalog
                .due_for_validation(content_type, stale_before, limit),
        )
        .await?;

        run.begin_type(content_type, items.len());
        self.save_progress(run).await;
        if items.is_empty() {
            debug!(run_id = %run.id, content_type = %content_type, "nothing due for validation");
            return Ok(());
        }
        info!(
            run_id = %run.id,
            content_type = %content_type,
            selected = items.len(),
            "validating items"
        );

        for batch in items.chunks(self.config.batch_size.max(1)) {
            let ids: Vec<String> = batch.iter().map(|item| item.external_id.clone()).collect();
            let results = self.validator.validate_batch(content_type, &ids).await;

            for item in batch {
                let outcome = results
                    .outcome_for(&item.external_id)
                    .cloned()
                    .unwrap_or_else(|| {
                        ItemOutcome::Error(GatewayFailure::new(
                            "MissingResult",
                            "validator returned no outcome for this item",
                        ))
                    });
                self.apply_outcome(run, item, outcome, actor).await;
            }
            self.save_progress(run).await;
        }
        Ok(())
    }

    async fn apply_outcome(
        &self,
        run: &mut ValidationRun,
        item: &CatalogItem,
        outcome: ItemOutcome,
        actor: &str,
    ) {
        let content_type = item.content_type;
        let now = self.clock.now();
        let update = ValidationUpdate {
            status: outcome.resulting_status(),
            validated_at: now,
            title: match &outcome {
                ItemOutcome::Valid(details) => details.title.clone(),
                ItemOutcome::NotFound | ItemOutcome::Error(_) => None,
            },
        };

        let written = bounded(
            self.timeouts.write(),
            "catalog validation write",
            self.catalog.record_validation(content_type, item.id, &update),
        )
        .await;

        match written {
            Ok(true) => {}
            Ok(false) => {
                debug!(item_id = %item.id, "item removed before its outcome was written");
                run.record_skipped(content_type);
                return;
            }
            Err(err) => {
                warn!(
                    item_id = %item.id,
                    error = %err,
                    "failed to write validation outcome; skipping item"
                );
                run.record_skipped(content_type);
                return;
            }
        }

        run.record_outcome(content_type, &item.external_id, &outcome);

        match &outcome {
            ItemOutcome::NotFound => {
                info!(
                    run_id = %run.id,
                    content_type = %content_type,
                    external_id = %item.external_id,
                    "item archived: confirmed gone upstream"
                );
                let event = AuditEvent::new(
                    format!("{}_auto_archived", content_type.as_str()),
                    content_type.as_str(),
                    item.id.to_string(),
                    actor,
                    now,
                );
                if let Err(err) = self.audit.record(event).await {
                    warn!(
                        item_id = %item.id,
                        error = %err,
                        "failed to record archival audit event"
                    );
                }
            }
            ItemOutcome::Error(failure) => debug!(
                external_id = %item.external_id,
                error = %failure,
                "item marked ERROR; retried after the staleness window"
            ),
            ItemOutcome::Valid(_) => {}
        }
    }

    async fn persist(&self, run: &ValidationRun) -> Result<()> {
        bounded(self.timeouts.write(), "validation run write", self.runs.save(run)).await
    }

    async fn save_progress(&self, run: &ValidationRun) {
        if let Err(err) = self.persist(run).await {
            warn!(run_id = %run.id, error = %err, "failed to persist validation progress");
        }
    }
}

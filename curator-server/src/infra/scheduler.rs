use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use curator_core::{
    CurationError,
    coordination::CircuitBreakerService,
    validation::{RunRequest, TriggerType, ValidationRun, ValidationService},
};
use futures::FutureExt;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{config::SchedulerConfig, workers::execute_supervised};

/// What one scheduler tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Disabled,
    /// The breaker is open and still cooling down.
    BreakerOpen,
    /// Another instance (or a manual trigger) holds the scheduler lock.
    LockHeld,
    Ran(ValidationRun),
    Failed(CurationError),
}

/// Periodic trigger for validation runs. Every instance runs one; the
/// scheduler lock makes sure only one of them does work per interval.
pub struct ValidationScheduler {
    config: SchedulerConfig,
    service: Arc<ValidationService>,
    breaker: Arc<CircuitBreakerService>,
}

impl fmt::Debug for ValidationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ValidationScheduler {
    pub fn new(
        config: SchedulerConfig,
        service: Arc<ValidationService>,
        breaker: Arc<CircuitBreakerService>,
    ) -> Self {
        Self {
            config,
            service,
            breaker,
        }
    }

    /// Run [`Self::tick`] every interval after the initial delay.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled || self.config.interval_minutes == 0 {
                info!("validation scheduler disabled");
                return;
            }
            tokio::time::sleep(self.config.initial_delay()).await;
            let mut interval = tokio::time::interval(self.config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                interval_minutes = self.config.interval_minutes,
                scope = ?self.config.scope,
                "validation scheduler started"
            );
            loop {
                interval.tick().await;
                if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                    error!("scheduler tick panicked; waiting for the next interval");
                }
            }
        })
    }

    pub async fn tick(&self) -> TickOutcome {
        if !self.config.enabled {
            debug!("scheduled validation disabled; skipping");
            return TickOutcome::Disabled;
        }

        if self.breaker_blocks().await {
            info!("circuit breaker open; skipping scheduled validation");
            return TickOutcome::BreakerOpen;
        }

        let request = RunRequest::new(self.config.scope.run_scope(), TriggerType::Scheduled)
            .with_max_items(self.config.max_items);

        let pending = match self.service.begin(request).await {
            Ok(pending) => pending,
            Err(CurationError::Conflict(_)) => {
                info!("scheduler lock held elsewhere; skipping scheduled validation");
                return TickOutcome::LockHeld;
            }
            Err(err) => {
                error!(error = %err, "failed to start scheduled validation");
                return TickOutcome::Failed(err);
            }
        };

        let run = match execute_supervised(&self.service, pending).await {
            Ok(run) => run,
            Err(err) => {
                error!(error = %err, "scheduled validation could not be finalized");
                return TickOutcome::Failed(err);
            }
        };
        info!(
            run_id = %run.id,
            status = %run.status,
            checked = run.counters.total_checked(),
            archived = run.counters.total_archived(),
            "scheduled validation finished"
        );
        TickOutcome::Ran(run)
    }

    /// An elapsed cooldown does not block: the run claims the probe.
    async fn breaker_blocks(&self) -> bool {
        if !self.breaker.is_enabled() {
            return false;
        }
        match self.breaker.status().await {
            Ok(status) => status.is_cooling_down(),
            Err(err) => {
                warn!(error = %err, "circuit breaker state unreadable; treating as open");
                true
            }
        }
    }
}

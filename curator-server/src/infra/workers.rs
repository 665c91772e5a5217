use std::{
    any::Any,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use curator_core::{
    Result,
    validation::{PendingRun, ValidationRun, ValidationService},
};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

use super::config::WorkerPoolConfig;

/// Drive `pending` to completion. A panic while executing is caught and the
/// run is finalized as FAILED from its last persisted progress, releasing the
/// scheduler lock.
pub async fn execute_supervised(
    service: &ValidationService,
    pending: PendingRun,
) -> Result<ValidationRun> {
    let run_id = pending.id();
    match AssertUnwindSafe(service.execute(pending)).catch_unwind().await {
        Ok(run) => Ok(run),
        Err(payload) => {
            let message = format!("validation run panicked: {}", panic_message(payload.as_ref()));
            error!(run_id = %run_id, %message, "validation run panicked");
            service.fail_orphaned(run_id, &message).await
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[derive(Debug, Default)]
struct WorkerCounters {
    queued: AtomicUsize,
    active: AtomicUsize,
    rejections: AtomicU64,
}

/// Point-in-time view of the pool for the metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPoolSnapshot {
    pub pool_size: usize,
    pub queue_capacity: usize,
    pub queued_jobs: usize,
    pub active_jobs: usize,
    pub total_rejections: u64,
}

/// Fixed set of tasks executing asynchronously triggered validation runs.
///
/// Request handlers hand over a [`PendingRun`] and return immediately; a
/// worker picks it up from a bounded queue and drives it to completion.
pub struct ValidationWorkers {
    tx: mpsc::Sender<PendingRun>,
    counters: Arc<WorkerCounters>,
    config: WorkerPoolConfig,
}

impl fmt::Debug for ValidationWorkers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationWorkers")
            .field("config", &self.config)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl ValidationWorkers {
    /// Spawn `config.size` workers on the current runtime.
    pub fn spawn(config: WorkerPoolConfig, service: Arc<ValidationService>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(WorkerCounters::default());

        for id in 0..config.size.max(1) {
            let rx = Arc::clone(&rx);
            let counters = Arc::clone(&counters);
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                Self::worker_loop(id, rx, counters, service).await;
            });
        }

        info!(
            workers = config.size,
            queue_capacity = config.queue_capacity,
            "validation worker pool started"
        );

        Self {
            tx,
            counters,
            config,
        }
    }

    /// Queue `pending` for execution. A full or closed queue hands the run
    /// back so the caller can abandon it and release the lock.
    pub fn submit(&self, pending: PendingRun) -> std::result::Result<(), PendingRun> {
        let run_id = pending.id();
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(pending) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(pending)) => {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                self.counters.rejections.fetch_add(1, Ordering::SeqCst);
                warn!(run_id = %run_id, "validation worker queue full; run rejected");
                Err(pending)
            }
            Err(mpsc::error::TrySendError::Closed(pending)) => {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                self.counters.rejections.fetch_add(1, Ordering::SeqCst);
                error!(run_id = %run_id, "validation worker pool is shut down");
                Err(pending)
            }
        }
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.config.retry_after_secs
    }

    pub fn snapshot(&self) -> WorkerPoolSnapshot {
        WorkerPoolSnapshot {
            pool_size: self.config.size,
            queue_capacity: self.config.queue_capacity,
            queued_jobs: self.counters.queued.load(Ordering::SeqCst),
            active_jobs: self.counters.active.load(Ordering::SeqCst),
            total_rejections: self.counters.rejections.load(Ordering::SeqCst),
        }
    }

    async fn worker_loop(
        id: usize,
        rx: Arc<Mutex<mpsc::Receiver<PendingRun>>>,
        counters: Arc<WorkerCounters>,
        service: Arc<ValidationService>,
    ) {
        loop {
            let next = rx.lock().await.recv().await;
            let Some(pending) = next else {
                info!(worker = id, "validation worker shutting down");
                break;
            };

            counters.queued.fetch_sub(1, Ordering::SeqCst);
            counters.active.fetch_add(1, Ordering::SeqCst);
            let run_id = pending.id();
            info!(worker = id, run_id = %run_id, "worker picked up validation run");

            if let Err(err) = execute_supervised(&service, pending).await {
                error!(
                    worker = id,
                    run_id = %run_id,
                    error = %err,
                    "validation run left unfinalized"
                );
            }

            counters.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

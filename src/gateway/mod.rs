//! Scheduler gateway
//!
//! Bridges the entity store and the external scheduler: explicit `start` and
//! `cancel` transitions, and the synchronization pass that reconciles
//! scheduler listings into worker records.
//!
//! Every mutation is a guarded store update, so a sync pass may run
//! concurrently with `start` and `cancel` from other callers.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::errors::{BatchError, BatchResult, Operation};
use crate::model::{Worker, WorkerStatus};
use crate::scheduler::{ListCategory, Scheduler};
use crate::store::Store;

/// Worker ids changed by one synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Workers whose remaining time changed
    pub refreshed: Vec<i64>,
    /// Workers whose status or host changed
    pub placed: Vec<i64>,
    /// Workers that left the queue and were marked completed
    pub completed: Vec<i64>,
}

impl SyncReport {
    /// Returns true when the pass mutated nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refreshed.is_empty() && self.placed.is_empty() && self.completed.is_empty()
    }
}

/// Scheduler-facing worker operations
#[derive(Clone)]
pub struct SchedulerGateway {
    store: Store,
    scheduler: Arc<dyn Scheduler>,
}

impl std::fmt::Debug for SchedulerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerGateway")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl SchedulerGateway {
    /// Creates a gateway over `store` and `scheduler`
    pub fn new(store: Store, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Store the gateway writes to
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Submits a prepared worker's script and moves it to `idle`
    ///
    /// If another caller changes the worker while the script is being
    /// submitted, the fresh job is cancelled again and the transition is
    /// rejected.
    ///
    /// # Errors
    ///
    /// [`BatchError::InvalidStateTransition`] unless the worker is
    /// `prepared`; [`BatchError::SchedulerUnavailable`] when submission
    /// fails, in which case the worker is left untouched.
    pub async fn start(&self, id: i64) -> BatchResult<Worker> {
        let worker = self.store.worker(id).await?;
        if !worker.status.can_start() {
            return Err(rejected(id, Operation::Start, worker.status));
        }

        let job_id = self.scheduler.submit(&worker.script_path()).await?;
        if !self.store.mark_started(id, &job_id).await? {
            if let Err(err) = self.scheduler.cancel(&job_id).await {
                warn!(worker = id, job = %job_id, error = %err, "Failed to cancel orphaned job");
            }
            let current = self.store.worker(id).await?;
            return Err(rejected(id, Operation::Start, current.status));
        }

        info!(worker = id, job = %job_id, "Worker started");
        Ok(self.store.worker(id).await?)
    }

    /// Cancels a live worker
    ///
    /// The scheduler-side cancel is best effort: a failure is logged and the
    /// worker is still marked `cancelled`.
    ///
    /// # Errors
    ///
    /// [`BatchError::InvalidStateTransition`] unless the worker is live.
    pub async fn cancel(&self, id: i64) -> BatchResult<Worker> {
        let worker = self.store.worker(id).await?;
        if !worker.status.can_cancel() {
            return Err(rejected(id, Operation::Cancel, worker.status));
        }

        if let Some(job_id) = &worker.moab_id
            && let Err(err) = self.scheduler.cancel(job_id).await
        {
            warn!(worker = id, job = %job_id, error = %err, "Scheduler cancel failed");
        }

        if !self.store.mark_cancelled(id).await? {
            let current = self.store.worker(id).await?;
            return Err(rejected(id, Operation::Cancel, current.status));
        }

        info!(worker = id, "Worker cancelled");
        Ok(self.store.worker(id).await?)
    }

    /// Reconciles scheduler listings into live workers
    ///
    /// Listed jobs refresh their worker's remaining time, status and host.
    /// Live workers whose job is in none of the listings are marked
    /// `completed`. Prepared, completed and cancelled workers are never
    /// touched. Running the pass again against unchanged listings changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`BatchError::SchedulerUnavailable`] when any listing or detail query
    /// fails; no worker is marked completed in that case.
    pub async fn sync(&self) -> BatchResult<SyncReport> {
        // Snapshot before listing so a worker started mid-pass is not
        // mistaken for one that left the queue.
        let live = self.store.workers_with_status(&WorkerStatus::LIVE).await?;

        let mut listings = Vec::new();
        for category in ListCategory::ALL {
            listings.extend(self.scheduler.list(category).await?);
        }

        let by_job: HashMap<&str, i64> = live
            .iter()
            .filter_map(|worker| worker.moab_id.as_deref().map(|job| (job, worker.id)))
            .collect();

        let mut report = SyncReport::default();
        let mut seen = HashSet::new();

        for job in &listings {
            let Some(&id) = by_job.get(job.job_id.as_str()) else {
                continue;
            };
            seen.insert(id);

            if self.store.record_remaining(id, &job.remaining).await? {
                report.refreshed.push(id);
            }

            let detail = self.scheduler.detail(&job.job_id).await?;
            if self
                .store
                .record_placement(id, job.category.status(), detail.host.as_deref())
                .await?
            {
                debug!(worker = id, status = %job.category, host = ?detail.host, "Worker placed");
                report.placed.push(id);
            }
        }

        for worker in live.iter().filter(|worker| !seen.contains(&worker.id)) {
            if self.store.mark_completed(worker.id).await? {
                info!(worker = worker.id, job = ?worker.moab_id, "Worker completed");
                report.completed.push(worker.id);
            }
        }

        Ok(report)
    }

    /// Runs [`sync`](Self::sync) every `interval` until `shutdown` resolves
    ///
    /// Transient failures are logged and retried on the next tick. A pass
    /// interrupted by `shutdown` is abandoned; its applied updates stand.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient failure.
    pub async fn watch<F>(&self, interval: Duration, shutdown: F) -> BatchResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                () = &mut shutdown => break,
                outcome = self.sync() => outcome,
            };

            match outcome {
                Ok(report) if report.is_empty() => debug!("Sync pass found no changes"),
                Ok(report) => info!(
                    refreshed = report.refreshed.len(),
                    placed = report.placed.len(),
                    completed = report.completed.len(),
                    "Sync pass applied"
                ),
                Err(err) if err.is_transient() => warn!(error = %err, "Sync pass failed, retrying"),
                Err(err) => return Err(err),
            }
        }

        info!("Sync watch stopped");
        Ok(())
    }
}

fn rejected(worker: i64, operation: Operation, status: WorkerStatus) -> BatchError {
    BatchError::InvalidStateTransition {
        worker,
        operation,
        status,
    }
}

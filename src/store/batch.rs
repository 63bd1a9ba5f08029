//! Transactional batch creation

use std::path::PathBuf;

use chrono::Utc;
use sqlx::{Sqlite, Transaction};

use super::{Store, StoreResult, provision_dir, remove_dir};
use crate::model::{Subtask, Task, Worker, WorkerStatus};

/// Writes one batch's worker, tasks and subtasks inside a single transaction
///
/// Nothing becomes visible to other readers until [`commit`](Self::commit).
/// On failure call [`rollback`](Self::rollback), which also removes the
/// directories provisioned so far; dropping the writer rolls back the
/// records but leaves directories behind.
#[derive(Debug)]
pub struct BatchWriter<'s> {
    store: &'s Store,
    tx: Transaction<'static, Sqlite>,
    provisioned: Vec<PathBuf>,
}

impl<'s> BatchWriter<'s> {
    pub(super) fn new(store: &'s Store, tx: Transaction<'static, Sqlite>) -> Self {
        Self {
            store,
            tx,
            provisioned: Vec::new(),
        }
    }

    /// Inserts a worker and provisions its directory
    ///
    /// # Errors
    ///
    /// Fails on database errors or when the directory cannot be created.
    pub async fn create_worker(&mut self, handle: Option<&str>) -> StoreResult<Worker> {
        let created_at = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO workers (handle, status, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(handle)
        .bind(WorkerStatus::Prepared.as_str())
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        let dir = self.store.worker_dir(id);
        provision_dir(&dir).await?;
        self.provisioned.push(dir.clone());
        tracing::debug!(worker = id, dir = %dir.display(), "Worker created");

        Ok(Worker {
            id,
            handle: handle.map(str::to_string),
            status: WorkerStatus::Prepared,
            moab_id: None,
            host: None,
            remaining: None,
            ppn: None,
            queue: None,
            walltime: None,
            created_at,
            dir,
        })
    }

    /// Inserts the task at `ordinal` within `worker`
    ///
    /// # Errors
    ///
    /// Fails on database errors, including a duplicate ordinal.
    pub async fn create_task(&mut self, worker: &Worker, ordinal: u32, sample: &str) -> StoreResult<Task> {
        let row_id: i64 = sqlx::query_scalar(
            "INSERT INTO tasks (worker_id, ordinal, sample) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(worker.id)
        .bind(ordinal)
        .bind(sample)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Task {
            row_id,
            worker_id: worker.id,
            ordinal,
            sample: sample.to_string(),
            worker_dir: worker.dir.clone(),
        })
    }

    /// Inserts the subtask at `ordinal` within `task`
    ///
    /// # Errors
    ///
    /// Fails on database errors, including a duplicate ordinal.
    pub async fn create_subtask(&mut self, task: &Task, ordinal: u32, block: &str) -> StoreResult<Subtask> {
        let row_id: i64 = sqlx::query_scalar(
            "INSERT INTO subtasks (task_id, ordinal, block) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(task.row_id)
        .bind(ordinal)
        .bind(block)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Subtask {
            row_id,
            task_id: task.row_id,
            ordinal,
            block: block.to_string(),
            log: task.subtask_log(ordinal),
        })
    }

    /// Stamps the worker as prepared with its scheduling parameters
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn mark_prepared(
        &mut self,
        worker: &mut Worker,
        ppn: u32,
        queue: &str,
        walltime: &str,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE workers SET status = ?, ppn = ?, queue = ?, walltime = ? WHERE id = ?")
            .bind(WorkerStatus::Prepared.as_str())
            .bind(ppn)
            .bind(queue)
            .bind(walltime)
            .bind(worker.id)
            .execute(&mut *self.tx)
            .await?;

        worker.status = WorkerStatus::Prepared;
        worker.ppn = Some(ppn);
        worker.queue = Some(queue.to_string());
        worker.walltime = Some(walltime.to_string());
        Ok(())
    }

    /// Makes the batch visible
    ///
    /// # Errors
    ///
    /// Fails when the transaction cannot be committed.
    pub async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Discards the batch's records and removes its directories
    ///
    /// # Errors
    ///
    /// Fails when the transaction cannot be rolled back or a directory
    /// cannot be removed.
    pub async fn rollback(self) -> StoreResult<()> {
        let Self { tx, provisioned, .. } = self;
        let rolled_back = tx.rollback().await;
        for dir in &provisioned {
            remove_dir(dir).await?;
        }
        rolled_back?;
        tracing::debug!(dirs = provisioned.len(), "Batch rolled back");
        Ok(())
    }
}

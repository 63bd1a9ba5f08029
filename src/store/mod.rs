//! Persistent entity store
//!
//! Workers, tasks and subtasks live in a SQLite database. Every status
//! change is a single guarded `UPDATE` whose `WHERE` clause re-checks the
//! allowed source statuses, so concurrent callers cannot race a worker into
//! an inconsistent state. Each guarded update reports whether it changed a
//! row.

mod batch;
mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;

use crate::model::{Subtask, Task, UnknownStatus, Worker, WorkerStatus};

pub use batch::BatchWriter;
use schema::{SCHEMA, WORKER_COLUMNS};

/// Errors raised by the store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Worker directory could not be created or removed
    #[error("worker directory {}: {source}", path.display())]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No worker with this id
    #[error("worker {0} not found")]
    WorkerNotFound(i64),

    /// A stored status could not be parsed
    #[error("corrupt worker record: {0}")]
    CorruptStatus(#[from] UnknownStatus),
}

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Handle to the entity store
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    workers_root: PathBuf,
}

impl Store {
    /// Opens (or creates) a file-backed store
    ///
    /// Worker directories are provisioned under `workers_root`, resolved
    /// against the current directory when relative.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be opened or its schema created.
    pub async fn open(db_path: impl AsRef<Path>, workers_root: impl Into<PathBuf>) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        Self::bootstrap(pool, workers_root.into()).await
    }

    /// Opens an in-memory store
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be created.
    pub async fn open_memory(workers_root: impl Into<PathBuf>) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // A single connection that is never recycled keeps the database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(opts)
            .await?;
        Self::bootstrap(pool, workers_root.into()).await
    }

    async fn bootstrap(pool: SqlitePool, workers_root: PathBuf) -> StoreResult<Self> {
        // Paths end up in job scripts that `cd` elsewhere before running.
        let workers_root = std::path::absolute(&workers_root).map_err(|source| StoreError::Directory {
            path: workers_root.clone(),
            source,
        })?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::debug!(workers_root = %workers_root.display(), "Store ready");
        Ok(Self { pool, workers_root })
    }

    /// Closes the underlying connections
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Root directory of all worker directories
    #[must_use]
    pub fn workers_root(&self) -> &Path {
        &self.workers_root
    }

    /// Directory of the worker with the given id
    #[must_use]
    pub fn worker_dir(&self, id: i64) -> PathBuf {
        self.workers_root.join(id.to_string())
    }

    /// Starts the transaction a batch is prepared in
    ///
    /// # Errors
    ///
    /// Fails when the transaction cannot be started.
    pub async fn begin_batch(&self) -> StoreResult<BatchWriter<'_>> {
        let tx = self.pool.begin().await?;
        Ok(BatchWriter::new(self, tx))
    }

    /// Loads a worker
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerNotFound`] for an unknown id.
    pub async fn worker(&self, id: i64) -> StoreResult<Worker> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::WorkerNotFound(id))?;
        self.worker_from_row(&row)
    }

    /// Loads every worker, oldest first
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn workers(&self) -> StoreResult<Vec<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|row| self.worker_from_row(row)).collect()
    }

    /// Loads the workers whose status is one of `statuses`
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn workers_with_status(&self, statuses: &[WorkerStatus]) -> StoreResult<Vec<Worker>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE status IN ({placeholders}) ORDER BY id"
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| self.worker_from_row(row)).collect()
    }

    /// Finds the worker submitted as scheduler job `moab_id`
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn find_by_job(&self, moab_id: &str) -> StoreResult<Option<Worker>> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE moab_id = ? ORDER BY id");
        let row = sqlx::query(&sql)
            .bind(moab_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| self.worker_from_row(&row)).transpose()
    }

    /// Loads a worker's tasks in ordinal order
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn tasks(&self, worker_id: i64) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, worker_id, ordinal, sample FROM tasks WHERE worker_id = ? ORDER BY ordinal",
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        let worker_dir = self.worker_dir(worker_id);
        rows.iter()
            .map(|row| -> StoreResult<Task> {
                Ok(Task {
                    row_id: row.try_get("id")?,
                    worker_id: row.try_get("worker_id")?,
                    ordinal: row.try_get("ordinal")?,
                    sample: row.try_get("sample")?,
                    worker_dir: worker_dir.clone(),
                })
            })
            .collect()
    }

    /// Loads a task's subtasks in ordinal order
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn subtasks(&self, task: &Task) -> StoreResult<Vec<Subtask>> {
        let rows = sqlx::query(
            "SELECT id, task_id, ordinal, block FROM subtasks WHERE task_id = ? ORDER BY ordinal",
        )
        .bind(task.row_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<Subtask> {
                let ordinal: u32 = row.try_get("ordinal")?;
                Ok(Subtask {
                    row_id: row.try_get("id")?,
                    task_id: row.try_get("task_id")?,
                    ordinal,
                    block: row.try_get("block")?,
                    log: task.subtask_log(ordinal),
                })
            })
            .collect()
    }

    /// `prepared` → `idle`, recording the scheduler job id
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn mark_started(&self, id: i64, moab_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE workers SET status = ?, moab_id = ? WHERE id = ? AND status = ?",
        )
        .bind(WorkerStatus::Idle.as_str())
        .bind(moab_id)
        .bind(id)
        .bind(WorkerStatus::Prepared.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Live → `cancelled`
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn mark_cancelled(&self, id: i64) -> StoreResult<bool> {
        let result = bind_live(
            sqlx::query("UPDATE workers SET status = ? WHERE id = ? AND status IN (?, ?, ?)")
                .bind(WorkerStatus::Cancelled.as_str())
                .bind(id),
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Live → `completed` with nothing remaining
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn mark_completed(&self, id: i64) -> StoreResult<bool> {
        let result = bind_live(
            sqlx::query(
                "UPDATE workers SET status = ?, remaining = '0' WHERE id = ? AND status IN (?, ?, ?)",
            )
            .bind(WorkerStatus::Completed.as_str())
            .bind(id),
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records the remaining time of a live worker
    ///
    /// Returns false when the worker is not live or the value is unchanged.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn record_remaining(&self, id: i64, remaining: &str) -> StoreResult<bool> {
        let result = bind_live(
            sqlx::query(
                "UPDATE workers SET remaining = ? WHERE id = ? AND status IN (?, ?, ?) \
                 AND remaining IS NOT ?",
            )
            .bind(remaining)
            .bind(id),
        )
        .bind(remaining)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records the scheduler-reported status and host of a live worker
    ///
    /// Returns false when the worker is not live or nothing changed.
    ///
    /// # Errors
    ///
    /// Fails on database errors.
    pub async fn record_placement(
        &self,
        id: i64,
        status: WorkerStatus,
        host: Option<&str>,
    ) -> StoreResult<bool> {
        debug_assert!(status.is_live(), "placement status must be live");
        let result = bind_live(
            sqlx::query(
                "UPDATE workers SET status = ?, host = ? WHERE id = ? AND status IN (?, ?, ?) \
                 AND (status IS NOT ? OR host IS NOT ?)",
            )
            .bind(status.as_str())
            .bind(host)
            .bind(id),
        )
        .bind(status.as_str())
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes a worker with its tasks and subtasks, then its directory
    ///
    /// Never contacts the scheduler. A missing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkerNotFound`] for an unknown id.
    pub async fn destroy_worker(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM subtasks WHERE task_id IN (SELECT id FROM tasks WHERE worker_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM tasks WHERE worker_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM workers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(StoreError::WorkerNotFound(id));
        }
        tx.commit().await?;

        remove_dir(&self.worker_dir(id)).await?;
        tracing::info!(worker = id, "Worker destroyed");
        Ok(())
    }

    fn worker_from_row(&self, row: &SqliteRow) -> StoreResult<Worker> {
        let id: i64 = row.try_get("id")?;
        let status: String = row.try_get("status")?;
        let ppn: Option<i64> = row.try_get("ppn")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(Worker {
            id,
            handle: row.try_get("handle")?,
            status: status.parse()?,
            moab_id: row.try_get("moab_id")?,
            host: row.try_get("host")?,
            remaining: row.try_get("remaining")?,
            ppn: ppn.and_then(|n| u32::try_from(n).ok()),
            queue: row.try_get("queue")?,
            walltime: row.try_get("walltime")?,
            created_at,
            dir: self.worker_dir(id),
        })
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_live(query: SqliteQuery<'_>) -> SqliteQuery<'_> {
    WorkerStatus::LIVE
        .into_iter()
        .fold(query, |query, status| query.bind(status.as_str()))
}

async fn provision_dir(path: &Path) -> StoreResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| StoreError::Directory {
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_dir(path: &Path) -> StoreResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Directory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

//! Persisted worker, task and subtask records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::WorkerStatus;

/// A batch of samples submitted to the scheduler as one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Identity assigned by the store
    pub id: i64,
    /// Caller-supplied label
    pub handle: Option<String>,
    /// Lifecycle status
    pub status: WorkerStatus,
    /// Scheduler job identifier, set once submitted
    pub moab_id: Option<String>,
    /// Host the job was placed on
    pub host: Option<String>,
    /// Time remaining as reported by the scheduler
    pub remaining: Option<String>,
    /// Processors per node
    pub ppn: Option<u32>,
    /// Scheduler queue
    pub queue: Option<String>,
    /// Requested walltime
    pub walltime: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Working directory of the worker
    pub dir: PathBuf,
}

impl Worker {
    /// Working directory holding the script, captures and logs
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Submittable job script
    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.dir.join("job.sh")
    }

    /// Scheduler stdout capture
    #[must_use]
    pub fn stdout_path(&self) -> PathBuf {
        self.dir.join("job.stdout")
    }

    /// Scheduler stderr capture
    #[must_use]
    pub fn stderr_path(&self) -> PathBuf {
        self.dir.join("job.stderr")
    }
}

/// The per-sample unit within a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Row identity
    pub row_id: i64,
    /// Owning worker
    pub worker_id: i64,
    /// Position within the worker, starting at 1
    pub ordinal: u32,
    /// Sample payload
    pub sample: String,
    /// Directory of the owning worker
    pub worker_dir: PathBuf,
}

impl Task {
    /// Log of the subtask with the given ordinal
    #[must_use]
    pub fn subtask_log(&self, subtask: u32) -> PathBuf {
        self.worker_dir
            .join(format!("{}.{}.log", self.ordinal, subtask))
    }
}

/// The per-leaf unit within a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Row identity
    pub row_id: i64,
    /// Owning task row
    pub task_id: i64,
    /// Preorder leaf position within the task, starting at 1
    pub ordinal: u32,
    /// Identifier of the leaf block this subtask ran
    pub block: String,
    /// Log file of the leaf
    pub log: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> Worker {
        Worker {
            id: 7,
            handle: None,
            status: WorkerStatus::Prepared,
            moab_id: None,
            host: None,
            remaining: None,
            ppn: None,
            queue: None,
            walltime: None,
            created_at: Utc::now(),
            dir: PathBuf::from(".batchline/workers/7"),
        }
    }

    #[test]
    fn test_worker_paths() {
        let w = worker();
        assert_eq!(w.script_path(), Path::new(".batchline/workers/7/job.sh"));
        assert_eq!(w.stdout_path(), Path::new(".batchline/workers/7/job.stdout"));
        assert_eq!(w.stderr_path(), Path::new(".batchline/workers/7/job.stderr"));
    }

    #[test]
    fn test_task_paths() {
        let task = Task {
            row_id: 1,
            worker_id: 7,
            ordinal: 2,
            sample: "s".into(),
            worker_dir: worker().dir,
        };
        assert_eq!(task.subtask_log(3), Path::new(".batchline/workers/7/2.3.log"));
    }
}

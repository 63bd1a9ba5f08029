//! External batch scheduler
//!
//! The [`Scheduler`] trait is the only way the crate talks to the cluster:
//! submit a script, cancel a job, list jobs by queue category and query a
//! job's placement. [`MoabScheduler`] drives the Moab command-line tools;
//! [`ScriptedScheduler`] replays scripted scheduler output in memory.

mod moab;
pub mod parse;
mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::model::WorkerStatus;

pub use moab::MoabScheduler;
pub use scripted::ScriptedScheduler;

/// Errors raised while talking to the scheduler
///
/// Every variant is transient: the operation may succeed when retried.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The scheduler command could not be started
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The scheduler command started but its output could not be collected
    #[error("lost '{program}' while waiting for its output: {source}")]
    Wait {
        /// Program that was running.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The scheduler command did not finish in time
    #[error("'{program}' timed out after {timeout:?}")]
    Timeout {
        /// Program that timed out.
        program: String,
        /// Time allowed.
        timeout: Duration,
    },

    /// The scheduler command exited with a failure status
    #[error("'{program}' exited with code {code}: {stderr}")]
    CommandFailed {
        /// Program that failed.
        program: String,
        /// Exit code, or -1 when killed by a signal.
        code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The scheduler's output did not have the expected shape
    #[error("unparsable {what} output: '{output}'")]
    Unparsable {
        /// Which query produced the output.
        what: &'static str,
        /// Offending output.
        output: String,
    },

    /// A configured scheduler command is empty or malformed
    #[error("invalid scheduler command '{command}'")]
    InvalidCommand {
        /// Configured command line.
        command: String,
    },
}

/// Queue category a job is listed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListCategory {
    /// Eligible and waiting
    Idle,
    /// Held or deferred
    Blocked,
    /// Running
    Active,
}

impl ListCategory {
    /// Every category, in the order listings are queried
    pub const ALL: [Self; 3] = [Self::Idle, Self::Blocked, Self::Active];

    /// `showq` flag selecting this category
    #[must_use]
    pub fn flag(self) -> &'static str {
        match self {
            Self::Idle => "-i",
            Self::Blocked => "-b",
            Self::Active => "-r",
        }
    }

    /// Worker status a job in this category maps to
    #[must_use]
    pub fn status(self) -> WorkerStatus {
        match self {
            Self::Idle => WorkerStatus::Idle,
            Self::Blocked => WorkerStatus::Blocked,
            Self::Active => WorkerStatus::Active,
        }
    }
}

impl fmt::Display for ListCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.status(), f)
    }
}

/// One job line of a scheduler listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    /// Scheduler job identifier
    pub job_id: String,
    /// Remaining time, e.g. `1:23:45`
    pub remaining: String,
    /// Listing the job appeared in
    pub category: ListCategory,
}

/// Per-job detail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetail {
    /// First allocated host, once the job is placed
    pub host: Option<String>,
}

/// Capability set of an external batch scheduler
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submits a job script, returning the scheduler's job identifier
    async fn submit(&self, script: &Path) -> Result<String, SchedulerError>;

    /// Cancels a job
    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError>;

    /// Lists the current user's jobs in `category`
    async fn list(&self, category: ListCategory) -> Result<Vec<JobListing>, SchedulerError>;

    /// Queries one job's placement
    async fn detail(&self, job_id: &str) -> Result<JobDetail, SchedulerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_maps_to_live_status() {
        for category in ListCategory::ALL {
            assert!(category.status().is_live());
        }
        assert_eq!(ListCategory::Active.to_string(), "active");
        assert_eq!(ListCategory::Blocked.flag(), "-b");
    }

    #[test]
    fn test_error_messages() {
        let err = SchedulerError::Timeout {
            program: "showq".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "'showq' timed out after 30s");

        let err = SchedulerError::CommandFailed {
            program: "msub".into(),
            code: 1,
            stderr: "ERROR: cannot submit".into(),
        };
        assert!(err.to_string().contains("code 1"));
    }

    #[test]
    fn test_wait_and_spawn_messages_differ() {
        let spawn = SchedulerError::Spawn {
            program: "showq".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let wait = SchedulerError::Wait {
            program: "showq".into(),
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert!(spawn.to_string().starts_with("failed to run 'showq'"));
        assert!(wait.to_string().starts_with("lost 'showq' while waiting"));
    }
}

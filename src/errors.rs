//! Error types for batch operations

use std::fmt;

use thiserror::Error;

use crate::assembler::AssemblyError;
use crate::model::WorkerStatus;
use crate::scheduler::SchedulerError;
use crate::store::StoreError;

/// Worker operation guarded by the status state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Submission of a prepared worker
    Start,
    /// Cancellation of a live worker
    Cancel,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "started",
            Self::Cancel => "cancelled",
        })
    }
}

/// Errors surfaced by preparation and the scheduler-facing operations
#[derive(Error, Debug)]
pub enum BatchError {
    /// The worker's current status does not allow the operation
    #[error("worker {worker} could not be {operation}: status is {status}")]
    InvalidStateTransition {
        /// Worker id.
        worker: i64,
        /// Rejected operation.
        operation: Operation,
        /// Status observed when the operation was rejected.
        status: WorkerStatus,
    },

    /// The scheduler could not be reached or answered unexpectedly
    #[error("scheduler unavailable: {0}")]
    SchedulerUnavailable(#[from] SchedulerError),

    /// The metadata store failed
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// A batch could not be assembled; earlier batches stay committed
    #[error("batch {batch} could not be assembled: {source}")]
    Assembly {
        /// Zero-based index of the failed batch.
        batch: usize,
        /// Underlying assembly error.
        #[source]
        source: AssemblyError,
    },
}

impl BatchError {
    /// Whether retrying the same operation later may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SchedulerUnavailable(_))
    }
}

/// Result type for batch operations
pub type BatchResult<T> = Result<T, BatchError>;

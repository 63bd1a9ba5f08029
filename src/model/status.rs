//! Worker state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a worker
///
/// `prepared` → `idle` on start; `idle`/`blocked`/`active` follow the
/// scheduler; `completed` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Script written, not yet submitted
    Prepared,
    /// Queued by the scheduler
    Idle,
    /// Held by the scheduler
    Blocked,
    /// Running
    Active,
    /// Left the scheduler's queue
    Completed,
    /// Cancelled by the user
    Cancelled,
}

impl WorkerStatus {
    /// Statuses reconciled against the scheduler
    pub const LIVE: [Self; 3] = [Self::Idle, Self::Blocked, Self::Active];

    /// Every status
    pub const ALL: [Self; 6] = [
        Self::Prepared,
        Self::Idle,
        Self::Blocked,
        Self::Active,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Lowercase name used in storage and output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Idle => "idle",
            Self::Blocked => "blocked",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if `start` is allowed from this status
    #[must_use]
    pub fn can_start(self) -> bool {
        self == Self::Prepared
    }

    /// Returns true if `cancel` is allowed from this status
    #[must_use]
    pub fn can_cancel(self) -> bool {
        self.is_live()
    }

    /// Returns true while the job is known to the scheduler
    #[must_use]
    pub fn is_live(self) -> bool {
        Self::LIVE.contains(&self)
    }

    /// Returns true for statuses that never change again
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown worker status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for WorkerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

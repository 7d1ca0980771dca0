use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Seed job still pending or in flight
    Active,
    /// Every worker job has been created
    SeedingComplete,
    /// Every worker job finished, regardless of per-entity outcome
    Completed,
    /// Explicitly removed
    Deleted,
}

impl BatchState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Check if the seed job may still create worker jobs
    pub fn is_seeding(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if job outcomes are still being collected
    pub fn accepts_job_outcomes(&self) -> bool {
        matches!(self, Self::Active | Self::SeedingComplete)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::SeedingComplete => write!(f, "seeding_complete"),
            Self::Completed => write!(f, "completed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for BatchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "seeding_complete" => Ok(Self::SeedingComplete),
            "completed" => Ok(Self::Completed),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid batch state: {s}")),
        }
    }
}

/// Default state for new batches
impl Default for BatchState {
    fn default() -> Self {
        Self::Active
    }
}

/// Lifecycle of one seed job invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedJobState {
    Pending,
    Running,
    /// Same job, advanced cursor, new due time
    Rescheduled,
    /// Candidate set exhausted; the job is deleted
    Done,
}

impl fmt::Display for SeedJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Rescheduled => write!(f, "rescheduled"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Executor-visible state of a stored job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for its due time
    Pending,
    /// Claimed by an executor
    Running,
    /// Retry budget exhausted; never polled again
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::Pending
    }
}

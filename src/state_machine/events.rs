use serde::{Deserialize, Serialize};

/// Events that can trigger batch state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BatchEvent {
    /// The seed job exhausted the candidate set
    CompleteSeeding,
    /// The last outstanding worker job reported
    FinishJobs,
    /// The batch was removed by a caller
    Delete,
}

impl BatchEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CompleteSeeding => "complete_seeding",
            Self::FinishJobs => "finish_jobs",
            Self::Delete => "delete",
        }
    }
}

/// Events that can trigger seed job state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SeedJobEvent {
    Start,
    /// More candidates remain after this invocation
    Reschedule,
    /// Candidate set exhausted
    Exhaust,
    /// Invocation failed; the executor decides about the retry
    Fail(String),
}

impl SeedJobEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Reschedule => "reschedule",
            Self::Exhaust => "exhaust",
            Self::Fail(_) => "fail",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}

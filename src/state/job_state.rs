/// Job state definitions for tracking queue progress
///
/// A job moves `Waiting -> Active -> Completed`, or back from `Active` to
/// `Waiting` on a retryable failure, or to `Failed` once its attempts run out.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a job in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Job is eligible (or will be, once its backoff elapses) for dequeue
    Waiting,

    /// Job has been claimed by a consumer
    Active,

    /// Job finished successfully
    Completed,

    /// Job exhausted its attempts
    Failed,
}

impl JobState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the job still has work left (waiting or active)
    pub fn is_unfinished(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether `self -> next` is a legal transition
    ///
    /// `Active -> Waiting` is the retry path and the only backwards edge.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Active)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Waiting)
                | (Self::Active, Self::Failed)
        )
    }

    /// Converts the job state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a job state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> [Self; 4] {
        [Self::Waiting, Self::Active, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

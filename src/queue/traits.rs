//! Storage traits and error types for the job queue
//!
//! A `JobStore` is deliberately dumb: it persists and looks up jobs. The
//! state machine and retry policy live in `JobQueue`, which serializes all
//! store access behind one lock.

use crate::queue::Job;
use crate::state::{JobState, Lane};
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Returns true if the same call may succeed later
    ///
    /// A row that does not decode or a job that is gone stays that way.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Serialization(_) | Self::JobNotFound(_))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence backend for queued jobs
pub trait JobStore: Send {
    /// Inserts a new job
    fn insert(&mut self, job: &Job) -> StoreResult<()>;

    /// Gets a job by ID
    fn get(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Overwrites a stored job
    ///
    /// Fails with `JobNotFound` if the job doesn't exist.
    fn update(&mut self, job: &Job) -> StoreResult<()>;

    /// The waiting job in `lane` that became eligible first, if any is eligible at `now`
    ///
    /// Ties on eligibility time break on creation time. Rows that cannot be
    /// decoded are marked failed and skipped.
    fn next_ready(&mut self, lane: Lane, now: DateTime<Utc>) -> StoreResult<Option<Job>>;

    /// Gets all jobs in a specific state, across lanes
    ///
    /// Undecodable rows are marked failed and left out.
    fn jobs_in_state(&mut self, state: JobState) -> StoreResult<Vec<Job>>;

    /// Counts jobs of a lane in a state
    fn count_by_state(&self, lane: Lane, state: JobState) -> StoreResult<u64>;

    /// Counts waiting jobs of a lane still inside their backoff at `now`
    fn count_delayed(&self, lane: Lane, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Checks whether `source_id` has a waiting or active job in `lane`
    fn has_unfinished_for_source(&self, lane: Lane, source_id: &str) -> StoreResult<bool>;

    /// Deletes completed and failed jobs last touched before `before`
    fn delete_terminal_before(&mut self, before: DateTime<Utc>) -> StoreResult<usize>;

    /// Deletes every job
    fn clear(&mut self) -> StoreResult<usize>;
}

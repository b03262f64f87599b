//! Two-lane retrying job queue
//!
//! This module provides at-least-once delivery of work items:
//! - `JobQueue` implements the job state machine and backoff policy
//! - `JobStore` is the persistence contract, with SQLite and in-memory backends
//! - `retry` wraps queue calls that hit transient store failures

mod job_queue;
mod memory;
pub mod retry;
mod schema;
mod sqlite;
mod traits;

pub use job_queue::{JobQueue, QueueCounts};
pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;
pub use traits::{JobStore, StoreError, StoreResult};

use crate::config::QueueConfig;
use crate::crawler::ExtractedContent;
use crate::state::{JobState, Lane};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Fetch instructions for one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub source_id: String,

    /// Raw content-type tag; parsed by the worker so unknown tags fail the job
    pub content_type: String,

    pub url: String,
}

/// The work a job carries, one variant per lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobPayload {
    Crawl(CrawlRequest),
    Processing(ExtractedContent),
}

impl JobPayload {
    /// The lane this payload belongs on
    pub fn lane(&self) -> Lane {
        match self {
            Self::Crawl(_) => Lane::Crawl,
            Self::Processing(_) => Lane::Processing,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            Self::Crawl(request) => &request.source_id,
            Self::Processing(content) => &content.source_id,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Crawl(request) => &request.url,
            Self::Processing(content) => content.url.as_str(),
        }
    }
}

/// A queued unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,

    pub lane: Lane,

    pub payload: JobPayload,

    pub state: JobState,

    /// Failed attempts so far; never exceeds `max_attempts`
    pub attempt: u32,

    pub max_attempts: u32,

    /// Base of the exponential backoff (milliseconds)
    pub initial_backoff_ms: u64,

    /// Delay applied by the most recent retry (milliseconds)
    pub backoff_ms: u64,

    /// Earliest time the job may be dequeued
    pub available_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub last_error: Option<String>,
}

impl Job {
    pub fn source_id(&self) -> &str {
        self.payload.source_id()
    }

    pub fn url(&self) -> &str {
        self.payload.url()
    }

    /// Handle identifying this job for `complete` / `fail`
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            lane: self.lane,
        }
    }
}

/// Returned by `enqueue`; enough to find the job again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: Uuid,
    pub lane: Lane,
}

/// Per-job retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 5000,
        }
    }
}

impl EnqueueOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff_ms: config.initial_backoff,
        }
    }
}

/// What `fail` did with a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Job went back to waiting and becomes eligible at `available_at`
    Retrying {
        attempt: u32,
        delay: Duration,
        available_at: DateTime<Utc>,
    },

    /// Job ran out of attempts and is now failed for good
    Exhausted { attempt: u32, error: String },
}

/// Backoff before retry number `attempt` (1-based): `initial × 2^attempt`
///
/// Saturates instead of overflowing.
pub fn backoff_delay(initial_backoff_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(initial_backoff_ms.saturating_mul(factor))
}

//! The job queue state machine
//!
//! All store access goes through one mutex, so a job is claimed, completed
//! or failed by exactly one caller at a time.

use crate::config::QueueConfig;
use crate::queue::memory::MemoryJobStore;
use crate::queue::sqlite::SqliteJobStore;
use crate::queue::traits::JobStore;
use crate::queue::{backoff_delay, EnqueueOptions, FailOutcome, Job, JobHandle, JobPayload};
use crate::state::{JobState, Lane};
use crate::{QueueError, QueueResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Per-lane job counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    /// Waiting and eligible now
    pub waiting: u64,

    /// Waiting out a retry backoff
    pub delayed: u64,

    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    /// Jobs that still have work left
    pub fn unfinished(&self) -> u64 {
        self.waiting + self.delayed + self.active
    }

    pub fn total(&self) -> u64 {
        self.unfinished() + self.completed + self.failed
    }
}

/// Two-lane queue with per-job retry and exponential backoff
pub struct JobQueue {
    store: Mutex<Box<dyn JobStore>>,
    defaults: EnqueueOptions,
}

impl JobQueue {
    /// Creates a queue over an existing store
    pub fn new(store: Box<dyn JobStore>) -> Self {
        Self {
            store: Mutex::new(store),
            defaults: EnqueueOptions::default(),
        }
    }

    /// Creates a queue that keeps jobs in memory only
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryJobStore::new()))
    }

    /// Opens a durable queue backed by the SQLite database at `path`
    pub fn open(path: &Path) -> QueueResult<Self> {
        let store = SqliteJobStore::new(path)?;
        Ok(Self::new(Box::new(store)))
    }

    /// Builds the queue described by the `[queue]` config section
    pub fn from_config(config: &QueueConfig) -> QueueResult<Self> {
        let queue = match &config.database_path {
            Some(path) => {
                tracing::info!("Opening queue database: {}", path);
                Self::open(Path::new(path))?
            }
            None => {
                tracing::info!("No queue database configured; jobs are kept in memory");
                Self::in_memory()
            }
        };
        Ok(queue.with_defaults(EnqueueOptions::from_config(config)))
    }

    /// Sets the options `enqueue_default` uses
    pub fn with_defaults(mut self, defaults: EnqueueOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> EnqueueOptions {
        self.defaults
    }

    fn store(&self) -> QueueResult<MutexGuard<'_, Box<dyn JobStore>>> {
        self.store.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Adds a job to `lane` using the queue's default retry policy
    pub fn enqueue_default(&self, lane: Lane, payload: JobPayload) -> QueueResult<JobHandle> {
        self.enqueue(lane, payload, self.defaults)
    }

    /// Adds a waiting job to `lane`, eligible immediately
    pub fn enqueue(
        &self,
        lane: Lane,
        payload: JobPayload,
        options: EnqueueOptions,
    ) -> QueueResult<JobHandle> {
        self.enqueue_at(lane, payload, options, Utc::now())
    }

    pub fn enqueue_at(
        &self,
        lane: Lane,
        payload: JobPayload,
        options: EnqueueOptions,
        now: DateTime<Utc>,
    ) -> QueueResult<JobHandle> {
        if payload.lane() != lane {
            return Err(QueueError::LaneMismatch {
                expected: lane,
                actual: payload.lane(),
            });
        }

        let job = Job {
            id: Uuid::new_v4(),
            lane,
            payload,
            state: JobState::Waiting,
            attempt: 0,
            max_attempts: options.max_attempts.max(1),
            initial_backoff_ms: options.initial_backoff_ms,
            backoff_ms: 0,
            available_at: now,
            created_at: now,
            updated_at: now,
            last_error: None,
        };

        self.store()?.insert(&job)?;

        tracing::debug!(
            job_id = %job.id,
            lane = %lane,
            source_id = job.source_id(),
            "Enqueued job"
        );

        Ok(job.handle())
    }

    /// Claims the next eligible job in `lane`, if any
    ///
    /// Never blocks; the caller decides how long to wait before trying again.
    pub fn dequeue(&self, lane: Lane) -> QueueResult<Option<Job>> {
        self.dequeue_at(lane, Utc::now())
    }

    pub fn dequeue_at(&self, lane: Lane, now: DateTime<Utc>) -> QueueResult<Option<Job>> {
        let mut store = self.store()?;

        let Some(mut job) = store.next_ready(lane, now)? else {
            return Ok(None);
        };

        job.state = JobState::Active;
        job.updated_at = now;
        store.update(&job)?;

        tracing::trace!(job_id = %job.id, lane = %lane, attempt = job.attempt, "Dequeued job");

        Ok(Some(job))
    }

    /// Marks an active job completed
    ///
    /// Completing a job that already finished is a no-op.
    pub fn complete(&self, id: Uuid) -> QueueResult<()> {
        self.complete_at(id, Utc::now())
    }

    pub fn complete_at(&self, id: Uuid, now: DateTime<Utc>) -> QueueResult<()> {
        let mut store = self.store()?;
        let mut job = store.get(id)?.ok_or(QueueError::UnknownJob(id))?;

        if job.state.is_terminal() {
            return Ok(());
        }
        if !job.state.can_transition_to(JobState::Completed) {
            return Err(QueueError::InvalidTransition {
                from: job.state,
                to: JobState::Completed,
            });
        }

        job.state = JobState::Completed;
        job.updated_at = now;
        store.update(&job)?;

        tracing::debug!(job_id = %id, lane = %job.lane, "Completed job");
        Ok(())
    }

    /// Records a failed attempt of an active job
    ///
    /// The job either goes back to waiting behind an exponential backoff or,
    /// once its attempts are used up, becomes failed for good.
    pub fn fail(&self, id: Uuid, error: &str) -> QueueResult<FailOutcome> {
        self.fail_at(id, error, Utc::now())
    }

    pub fn fail_at(&self, id: Uuid, error: &str, now: DateTime<Utc>) -> QueueResult<FailOutcome> {
        let mut store = self.store()?;
        let mut job = store.get(id)?.ok_or(QueueError::UnknownJob(id))?;

        if job.state != JobState::Active {
            return Err(QueueError::InvalidTransition {
                from: job.state,
                to: JobState::Failed,
            });
        }

        job.attempt = (job.attempt + 1).min(job.max_attempts);
        job.last_error = Some(error.to_string());
        job.updated_at = now;

        let outcome = if job.attempt >= job.max_attempts {
            job.state = JobState::Failed;
            FailOutcome::Exhausted {
                attempt: job.attempt,
                error: error.to_string(),
            }
        } else {
            let delay = backoff_delay(job.initial_backoff_ms, job.attempt);
            let available_at = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or_else(|| now + chrono::Duration::days(36_500));

            job.state = JobState::Waiting;
            job.backoff_ms = delay.as_millis().min(u64::MAX as u128) as u64;
            job.available_at = available_at;

            FailOutcome::Retrying {
                attempt: job.attempt,
                delay,
                available_at,
            }
        };

        store.update(&job)?;
        Ok(outcome)
    }

    pub fn get(&self, id: Uuid) -> QueueResult<Option<Job>> {
        Ok(self.store()?.get(id)?)
    }

    pub fn counts(&self, lane: Lane) -> QueueResult<QueueCounts> {
        self.counts_at(lane, Utc::now())
    }

    pub fn counts_at(&self, lane: Lane, now: DateTime<Utc>) -> QueueResult<QueueCounts> {
        let store = self.store()?;
        let waiting = store.count_by_state(lane, JobState::Waiting)?;
        let delayed = store.count_delayed(lane, now)?;

        Ok(QueueCounts {
            waiting: waiting.saturating_sub(delayed),
            delayed,
            active: store.count_by_state(lane, JobState::Active)?,
            completed: store.count_by_state(lane, JobState::Completed)?,
            failed: store.count_by_state(lane, JobState::Failed)?,
        })
    }

    /// Checks whether `source_id` already has a waiting or active crawl job
    pub fn has_unfinished_crawl(&self, source_id: &str) -> QueueResult<bool> {
        Ok(self
            .store()?
            .has_unfinished_for_source(Lane::Crawl, source_id)?)
    }

    /// Returns jobs left active by a previous process to waiting
    ///
    /// Reclaimed jobs keep their attempt count; the interrupted run does not
    /// count as a failure.
    pub fn reclaim_active(&self) -> QueueResult<usize> {
        self.reclaim_active_at(Utc::now())
    }

    pub fn reclaim_active_at(&self, now: DateTime<Utc>) -> QueueResult<usize> {
        let mut store = self.store()?;
        let stranded = store.jobs_in_state(JobState::Active)?;

        for mut job in stranded.iter().cloned() {
            job.state = JobState::Waiting;
            job.available_at = now;
            job.updated_at = now;
            store.update(&job)?;
        }

        if !stranded.is_empty() {
            tracing::info!("Reclaimed {} job(s) left active by a previous run", stranded.len());
        }
        Ok(stranded.len())
    }

    /// Deletes completed and failed jobs last updated before `before`
    pub fn prune_terminal(&self, before: DateTime<Utc>) -> QueueResult<usize> {
        let removed = self.store()?.delete_terminal_before(before)?;
        if removed > 0 {
            tracing::debug!("Pruned {} finished job(s)", removed);
        }
        Ok(removed)
    }

    /// Deletes every job in both lanes
    pub fn clear(&self) -> QueueResult<usize> {
        Ok(self.store()?.clear()?)
    }
}

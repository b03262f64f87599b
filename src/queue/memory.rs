//! In-memory job store
//!
//! Used when no queue database is configured, and throughout the tests.
//! Nothing survives a restart.

use crate::queue::traits::{JobStore, StoreError, StoreResult};
use crate::queue::Job;
use crate::state::{JobState, Lane};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: HashMap<Uuid, Job>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&mut self, job: &Job) -> StoreResult<()> {
        if self.jobs.contains_key(&job.id) {
            return Err(StoreError::Database(format!("duplicate job id {}", job.id)));
        }
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.jobs.get(&id).cloned())
    }

    fn update(&mut self, job: &Job) -> StoreResult<()> {
        match self.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(StoreError::JobNotFound(job.id)),
        }
    }

    fn next_ready(&mut self, lane: Lane, now: DateTime<Utc>) -> StoreResult<Option<Job>> {
        Ok(self
            .jobs
            .values()
            .filter(|job| {
                job.lane == lane && job.state == JobState::Waiting && job.available_at <= now
            })
            .min_by_key(|job| (job.available_at, job.created_at, job.id))
            .cloned())
    }

    fn jobs_in_state(&mut self, state: JobState) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|job| job.state == state)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.created_at, job.id));
        Ok(jobs)
    }

    fn count_by_state(&self, lane: Lane, state: JobState) -> StoreResult<u64> {
        Ok(self
            .jobs
            .values()
            .filter(|job| job.lane == lane && job.state == state)
            .count() as u64)
    }

    fn count_delayed(&self, lane: Lane, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self
            .jobs
            .values()
            .filter(|job| {
                job.lane == lane && job.state == JobState::Waiting && job.available_at > now
            })
            .count() as u64)
    }

    fn has_unfinished_for_source(&self, lane: Lane, source_id: &str) -> StoreResult<bool> {
        Ok(self.jobs.values().any(|job| {
            job.lane == lane && job.state.is_unfinished() && job.source_id() == source_id
        }))
    }

    fn delete_terminal_before(&mut self, before: DateTime<Utc>) -> StoreResult<usize> {
        let len = self.jobs.len();
        self.jobs
            .retain(|_, job| !(job.state.is_terminal() && job.updated_at < before));
        Ok(len - self.jobs.len())
    }

    fn clear(&mut self) -> StoreResult<usize> {
        let len = self.jobs.len();
        self.jobs.clear();
        Ok(len)
    }
}

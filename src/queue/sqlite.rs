//! SQLite job store
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that string comparison orders them correctly.

use crate::queue::schema::initialize_schema;
use crate::queue::traits::{JobStore, StoreError, StoreResult};
use crate::queue::{Job, JobPayload};
use crate::state::{JobState, Lane};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, lane, state, payload, attempt, max_attempts, initial_backoff_ms,
     backoff_ms, available_at, created_at, updated_at, last_error";

/// SQLite storage backend for the queue
pub struct SqliteJobStore {
    conn: Connection,
}

impl SqliteJobStore {
    /// Opens (or creates) the queue database at `path`
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Decodes every row `sql` returns, quarantining the ones that don't decode
    fn query_jobs(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<Job>> {
        let raws: Vec<RawJob> = {
            let mut stmt = self.conn.prepare(sql)?;
            let rows = stmt.query_map(params, RawJob::from_row)?;
            let raws = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            raws
        };

        let now = Utc::now();
        let mut jobs = Vec::with_capacity(raws.len());
        for raw in raws {
            let id = raw.id.clone();
            match raw.into_job() {
                Ok(job) => jobs.push(job),
                Err(StoreError::Serialization(message)) => self.quarantine(&id, &message, now)?,
                Err(e) => return Err(e),
            }
        }
        Ok(jobs)
    }

    /// Marks an undecodable row failed so it never blocks its lane again
    fn quarantine(&self, id: &str, message: &str, now: DateTime<Utc>) -> StoreResult<()> {
        tracing::error!(job_id = id, error = message, "Job row cannot be decoded, marking it failed");

        let changed = self.conn.execute(
            "UPDATE jobs SET state = ?2, last_error = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id,
                JobState::Failed.to_db_string(),
                format!("undecodable job row: {}", message),
                to_db_time(&now)
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::Database(format!(
                "could not quarantine job row '{}'",
                id
            )));
        }
        Ok(())
    }
}

fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite integers are signed; larger values saturate
fn to_db_millis(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_time(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

/// A jobs row before its text columns are decoded
struct RawJob {
    id: String,
    lane: String,
    state: String,
    payload: String,
    attempt: i64,
    max_attempts: i64,
    initial_backoff_ms: i64,
    backoff_ms: i64,
    available_at: String,
    created_at: String,
    updated_at: String,
    last_error: Option<String>,
}

impl RawJob {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            lane: row.get(1)?,
            state: row.get(2)?,
            payload: row.get(3)?,
            attempt: row.get(4)?,
            max_attempts: row.get(5)?,
            initial_backoff_ms: row.get(6)?,
            backoff_ms: row.get(7)?,
            available_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            last_error: row.get(11)?,
        })
    }

    fn into_job(self) -> StoreResult<Job> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StoreError::Serialization(format!("bad job id '{}': {}", self.id, e)))?;
        let lane = Lane::from_db_string(&self.lane)
            .ok_or_else(|| StoreError::Serialization(format!("bad lane '{}'", self.lane)))?;
        let state = JobState::from_db_string(&self.state)
            .ok_or_else(|| StoreError::Serialization(format!("bad state '{}'", self.state)))?;
        let payload: JobPayload = serde_json::from_str(&self.payload)
            .map_err(|e| StoreError::Serialization(format!("bad payload for {}: {}", id, e)))?;

        Ok(Job {
            id,
            lane,
            payload,
            state,
            attempt: self.attempt.max(0) as u32,
            max_attempts: self.max_attempts.max(0) as u32,
            initial_backoff_ms: self.initial_backoff_ms.max(0) as u64,
            backoff_ms: self.backoff_ms.max(0) as u64,
            available_at: from_db_time(&self.available_at)?,
            created_at: from_db_time(&self.created_at)?,
            updated_at: from_db_time(&self.updated_at)?,
            last_error: self.last_error,
        })
    }
}

fn encode_payload(job: &Job) -> StoreResult<String> {
    serde_json::to_string(&job.payload)
        .map_err(|e| StoreError::Serialization(format!("payload for {}: {}", job.id, e)))
}

impl JobStore for SqliteJobStore {
    fn insert(&mut self, job: &Job) -> StoreResult<()> {
        let payload = encode_payload(job)?;
        self.conn.execute(
            "INSERT INTO jobs (id, lane, state, source_id, payload, attempt, max_attempts,
             initial_backoff_ms, backoff_ms, available_at, created_at, updated_at, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                job.id.to_string(),
                job.lane.to_db_string(),
                job.state.to_db_string(),
                job.source_id(),
                payload,
                job.attempt as i64,
                job.max_attempts as i64,
                to_db_millis(job.initial_backoff_ms),
                to_db_millis(job.backoff_ms),
                to_db_time(&job.available_at),
                to_db_time(&job.created_at),
                to_db_time(&job.updated_at),
                job.last_error,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let raw = self
            .conn
            .query_row(&sql, params![id.to_string()], RawJob::from_row)
            .optional()?;

        raw.map(RawJob::into_job).transpose()
    }

    fn update(&mut self, job: &Job) -> StoreResult<()> {
        let payload = encode_payload(job)?;
        let changed = self.conn.execute(
            "UPDATE jobs SET state = ?2, payload = ?3, attempt = ?4, max_attempts = ?5,
             initial_backoff_ms = ?6, backoff_ms = ?7, available_at = ?8, updated_at = ?9,
             last_error = ?10
             WHERE id = ?1",
            params![
                job.id.to_string(),
                job.state.to_db_string(),
                payload,
                job.attempt as i64,
                job.max_attempts as i64,
                to_db_millis(job.initial_backoff_ms),
                to_db_millis(job.backoff_ms),
                to_db_time(&job.available_at),
                to_db_time(&job.updated_at),
                job.last_error,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::JobNotFound(job.id));
        }
        Ok(())
    }

    fn next_ready(&mut self, lane: Lane, now: DateTime<Utc>) -> StoreResult<Option<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs
             WHERE lane = ?1 AND state = ?2 AND available_at <= ?3
             ORDER BY available_at ASC, created_at ASC, id ASC
             LIMIT 1",
            JOB_COLUMNS
        );

        // Each quarantined row leaves the waiting set, so this terminates
        loop {
            let raw = self
                .conn
                .query_row(
                    &sql,
                    params![
                        lane.to_db_string(),
                        JobState::Waiting.to_db_string(),
                        to_db_time(&now)
                    ],
                    RawJob::from_row,
                )
                .optional()?;

            let Some(raw) = raw else {
                return Ok(None);
            };

            let id = raw.id.clone();
            match raw.into_job() {
                Ok(job) => return Ok(Some(job)),
                Err(StoreError::Serialization(message)) => self.quarantine(&id, &message, now)?,
                Err(e) => return Err(e),
            }
        }
    }

    fn jobs_in_state(&mut self, state: JobState) -> StoreResult<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE state = ?1 ORDER BY created_at ASC, id ASC",
            JOB_COLUMNS
        );
        self.query_jobs(&sql, &[&state.to_db_string()])
    }

    fn count_by_state(&self, lane: Lane, state: JobState) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE lane = ?1 AND state = ?2",
            params![lane.to_db_string(), state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_delayed(&self, lane: Lane, now: DateTime<Utc>) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE lane = ?1 AND state = ?2 AND available_at > ?3",
            params![
                lane.to_db_string(),
                JobState::Waiting.to_db_string(),
                to_db_time(&now)
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn has_unfinished_for_source(&self, lane: Lane, source_id: &str) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM jobs WHERE lane = ?1 AND source_id = ?2 AND state IN (?3, ?4) LIMIT 1",
                params![
                    lane.to_db_string(),
                    source_id,
                    JobState::Waiting.to_db_string(),
                    JobState::Active.to_db_string()
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn delete_terminal_before(&mut self, before: DateTime<Utc>) -> StoreResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM jobs WHERE state IN (?1, ?2) AND updated_at < ?3",
            params![
                JobState::Completed.to_db_string(),
                JobState::Failed.to_db_string(),
                to_db_time(&before)
            ],
        )?;
        Ok(deleted)
    }

    fn clear(&mut self) -> StoreResult<usize> {
        Ok(self.conn.execute("DELETE FROM jobs", [])?)
    }
}

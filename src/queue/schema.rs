//! Database schema for the durable job queue

use rusqlite::Connection;

/// SQL schema for the queue database
pub const SCHEMA_SQL: &str = r#"
-- One row per job, both lanes
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    lane TEXT NOT NULL,
    state TEXT NOT NULL,
    source_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    attempt INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    initial_backoff_ms INTEGER NOT NULL,
    backoff_ms INTEGER NOT NULL DEFAULT 0,
    available_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_ready ON jobs(lane, state, available_at);
CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(lane, source_id, state);
CREATE INDEX IF NOT EXISTS idx_jobs_updated ON jobs(state, updated_at);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

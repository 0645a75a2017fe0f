use rusqlite::Connection;

use crate::error::Result;

/// Initialise the chronod schema in `conn`.
///
/// Creates the `jobs` and `job_executions` tables (idempotent) plus the
/// indexes the polling and listing queries depend on.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id               TEXT    NOT NULL PRIMARY KEY,
            name             TEXT    NOT NULL,
            description      TEXT    NOT NULL DEFAULT '',
            job_type         TEXT    NOT NULL DEFAULT 'custom',
            cron_expression  TEXT,               -- NULL when interval-based
            interval_seconds INTEGER,            -- NULL when cron-based
            job_data         TEXT    NOT NULL DEFAULT '{}',  -- opaque JSON payload
            max_retries      INTEGER NOT NULL DEFAULT 3,
            retry_count      INTEGER NOT NULL DEFAULT 0,
            timeout_seconds  INTEGER NOT NULL DEFAULT 3600,
            status           TEXT    NOT NULL DEFAULT 'pending',
            is_active        INTEGER NOT NULL DEFAULT 1,
            priority         INTEGER NOT NULL DEFAULT 5,
            next_run_time    TEXT,               -- ISO-8601 or NULL
            last_run_time    TEXT,               -- ISO-8601 or NULL
            total_runs       INTEGER NOT NULL DEFAULT 0,
            successful_runs  INTEGER NOT NULL DEFAULT 0,
            failed_runs      INTEGER NOT NULL DEFAULT 0,
            average_runtime  REAL    NOT NULL DEFAULT 0.0,
            created_by       TEXT    NOT NULL DEFAULT 'system',
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS job_executions (
            id            TEXT NOT NULL PRIMARY KEY,
            job_id        TEXT NOT NULL REFERENCES jobs(id),
            started_at    TEXT NOT NULL,
            completed_at  TEXT,
            duration      REAL,                  -- seconds
            status        TEXT NOT NULL,         -- 'completed' | 'failed'
            result        TEXT,
            error_message TEXT,
            stack_trace   TEXT,
            worker_node   TEXT NOT NULL
        ) STRICT;

        -- Trigger restore on startup: SELECT … WHERE is_active = 1
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run_active
            ON jobs (next_run_time, is_active);
        -- Listing order: priority DESC, created_at DESC
        CREATE INDEX IF NOT EXISTS idx_jobs_priority_created
            ON jobs (priority, created_at);
        -- Execution history, newest first per job
        CREATE INDEX IF NOT EXISTS idx_executions_job_started
            ON job_executions (job_id, started_at);
        ",
    )?;
    Ok(())
}

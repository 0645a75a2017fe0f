use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::types::{Job, JobExecution, JobFilter, JobStatus, JobType, Page};

const JOB_COLUMNS: &str = "id, name, description, job_type, cron_expression, interval_seconds,
     job_data, max_retries, retry_count, timeout_seconds, status, is_active,
     priority, next_run_time, last_run_time, total_runs, successful_runs,
     failed_runs, average_runtime, created_by, created_at, updated_at";

const EXECUTION_COLUMNS: &str = "id, job_id, started_at, completed_at, duration, status,
     result, error_message, stack_trace, worker_node";

/// Thread-safe repository for `Job` and `JobExecution` records.
///
/// Wraps a single SQLite connection in a `Mutex`; each subsystem opens
/// its own connection so the engine's polling never contends with the
/// service layer's queries.
pub struct JobStore {
    db: Mutex<Connection>,
}

impl JobStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Persist a freshly created job. The row is written in a single
    /// statement, so a failure leaves no partial state behind.
    pub fn insert_job(&self, job: &Job) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO jobs
             (id, name, description, job_type, cron_expression, interval_seconds,
              job_data, max_retries, retry_count, timeout_seconds, status, is_active,
              priority, next_run_time, last_run_time, total_runs, successful_runs,
              failed_runs, average_runtime, created_by, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22)",
            rusqlite::params![
                job.id,
                job.name,
                job.description,
                job.job_type.to_string(),
                job.cron_expression,
                job.interval_seconds,
                job.job_data.to_string(),
                job.max_retries,
                job.retry_count,
                job.timeout_seconds as i64,
                job.status.to_string(),
                job.is_active,
                job.priority,
                job.next_run_time.map(|t| t.to_rfc3339()),
                job.last_run_time.map(|t| t.to_rfc3339()),
                job.total_runs as i64,
                job.successful_runs as i64,
                job.failed_runs as i64,
                job.average_runtime,
                job.created_by,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Retrieve a job by ID, returning `None` if it does not exist.
    pub fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            rusqlite::params![id],
            row_to_job,
        ) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Overwrite a job's mutable configuration and scheduling state.
    ///
    /// Statistics columns are owned by [`commit_outcome`](Self::commit_outcome)
    /// and are deliberately not touched here.
    pub fn update_job(&self, job: &Job) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE jobs
             SET name = ?1, description = ?2, job_type = ?3, cron_expression = ?4,
                 interval_seconds = ?5, job_data = ?6, max_retries = ?7,
                 retry_count = ?8, timeout_seconds = ?9, status = ?10,
                 is_active = ?11, priority = ?12, next_run_time = ?13,
                 updated_at = ?14
             WHERE id = ?15",
            rusqlite::params![
                job.name,
                job.description,
                job.job_type.to_string(),
                job.cron_expression,
                job.interval_seconds,
                job.job_data.to_string(),
                job.max_retries,
                job.retry_count,
                job.timeout_seconds as i64,
                job.status.to_string(),
                job.is_active,
                job.priority,
                job.next_run_time.map(|t| t.to_rfc3339()),
                job.updated_at.to_rfc3339(),
                job.id,
            ],
        )?;
        if rows_changed == 0 {
            return Err(StoreError::JobNotFound {
                id: job.id.clone(),
            });
        }
        Ok(())
    }

    /// Delete a job together with its execution history in one
    /// transaction — explicit multi-row delete, no implicit cascade.
    pub fn delete_job(&self, id: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM job_executions WHERE job_id = ?1",
            rusqlite::params![id],
        )?;
        let rows_changed = tx.execute("DELETE FROM jobs WHERE id = ?1", rusqlite::params![id])?;
        if rows_changed == 0 {
            return Err(StoreError::JobNotFound { id: id.to_string() });
        }
        tx.commit()?;
        Ok(())
    }

    /// Filtered, paginated listing ordered by priority (desc) then
    /// creation time (desc). `page` is 1-based.
    pub fn list_jobs(&self, filter: &JobFilter, page: u32, per_page: u32) -> Result<Page<Job>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            params.push(Value::Text(status.to_string()));
        }
        if let Some(job_type) = filter.job_type {
            clauses.push("job_type = ?");
            params.push(Value::Text(job_type.to_string()));
        }
        if let Some(ref created_by) = filter.created_by {
            clauses.push("created_by = ?");
            params.push(Value::Text(created_by.clone()));
        }
        if let Some(is_active) = filter.is_active {
            clauses.push("is_active = ?");
            params.push(Value::Integer(is_active as i64));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let db = self.db.lock().unwrap();

        let total: u64 = db.query_row(
            &format!("SELECT COUNT(*) FROM jobs{where_sql}"),
            rusqlite::params_from_iter(params.iter()),
            |row| row.get::<_, i64>(0),
        )? as u64;

        let offset = (page.saturating_sub(1) as i64) * per_page as i64;
        params.push(Value::Integer(per_page as i64));
        params.push(Value::Integer(offset));

        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs{where_sql}
             ORDER BY priority DESC, created_at DESC
             LIMIT ? OFFSET ?"
        ))?;
        let items = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Paginated execution history for one job, newest first.
    pub fn list_executions(
        &self,
        job_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<JobExecution>> {
        let db = self.db.lock().unwrap();

        let total: u64 = db.query_row(
            "SELECT COUNT(*) FROM job_executions WHERE job_id = ?1",
            rusqlite::params![job_id],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let offset = (page.saturating_sub(1) as i64) * per_page as i64;
        let mut stmt = db.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM job_executions
             WHERE job_id = ?1
             ORDER BY started_at DESC
             LIMIT ?2 OFFSET ?3"
        ))?;
        let items = stmt
            .query_map(
                rusqlite::params![job_id, per_page as i64, offset],
                row_to_execution,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Jobs that should be re-armed on startup: active with a resolved
    /// next run time.
    pub fn schedulable_jobs(&self) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE is_active = 1 AND next_run_time IS NOT NULL"
        ))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Flip a job to `running` at execution start. Returns `false` when
    /// the job no longer exists (deleted since the trigger fired).
    pub fn mark_running(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "UPDATE jobs SET status = 'running', updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), id],
        )?;
        Ok(rows_changed > 0)
    }

    /// Commit one execution outcome: the job's scheduling state and
    /// statistics plus the finalized execution row, atomically.
    ///
    /// Returns `false` without writing anything when the job row is
    /// gone — a run that finished after its job was deleted leaves no
    /// orphaned execution behind.
    pub fn commit_outcome(&self, job: &Job, execution: &JobExecution) -> Result<bool> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let rows_changed = tx.execute(
            "UPDATE jobs
             SET status = ?1, retry_count = ?2, next_run_time = ?3,
                 last_run_time = ?4, total_runs = ?5, successful_runs = ?6,
                 failed_runs = ?7, average_runtime = ?8, updated_at = ?9
             WHERE id = ?10",
            rusqlite::params![
                job.status.to_string(),
                job.retry_count,
                job.next_run_time.map(|t| t.to_rfc3339()),
                job.last_run_time.map(|t| t.to_rfc3339()),
                job.total_runs as i64,
                job.successful_runs as i64,
                job.failed_runs as i64,
                job.average_runtime,
                job.updated_at.to_rfc3339(),
                job.id,
            ],
        )?;
        if rows_changed == 0 {
            debug!(job_id = %job.id, "job deleted mid-flight; outcome discarded");
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO job_executions
             (id, job_id, started_at, completed_at, duration, status,
              result, error_message, stack_trace, worker_node)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            rusqlite::params![
                execution.id,
                execution.job_id,
                execution.started_at.to_rfc3339(),
                execution.completed_at.map(|t| t.to_rfc3339()),
                execution.duration,
                execution.status.to_string(),
                execution.result,
                execution.error_message,
                execution.stack_trace,
                execution.worker_node,
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Best-effort bookkeeping for a dispatch-path failure: the job is
    /// marked failed and dormant so the engine can tear its trigger down.
    pub fn mark_dispatch_failed(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE jobs
             SET status = 'failed', failed_runs = failed_runs + 1,
                 next_run_time = NULL, updated_at = ?1
             WHERE id = ?2",
            rusqlite::params![now.to_rfc3339(), id],
        )?;
        Ok(())
    }
}

/// Map a SQLite row to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        job_type: parse_col(row.get::<_, String>(3)?.parse::<JobType>(), 3)?,
        cron_expression: row.get(4)?,
        interval_seconds: row.get(5)?,
        job_data: serde_json::from_str(&row.get::<_, String>(6)?)
            .unwrap_or(serde_json::Value::Null),
        max_retries: row.get(7)?,
        retry_count: row.get(8)?,
        timeout_seconds: row.get::<_, i64>(9)? as u64,
        status: parse_col(row.get::<_, String>(10)?.parse::<JobStatus>(), 10)?,
        is_active: row.get(11)?,
        priority: row.get(12)?,
        next_run_time: parse_ts(row.get(13)?, 13)?,
        last_run_time: parse_ts(row.get(14)?, 14)?,
        total_runs: row.get::<_, i64>(15)? as u64,
        successful_runs: row.get::<_, i64>(16)? as u64,
        failed_runs: row.get::<_, i64>(17)? as u64,
        average_runtime: row.get(18)?,
        created_by: row.get(19)?,
        created_at: parse_ts_req(row.get(20)?, 20)?,
        updated_at: parse_ts_req(row.get(21)?, 21)?,
    })
}

/// Map a SQLite row to a `JobExecution`.
fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobExecution> {
    Ok(JobExecution {
        id: row.get(0)?,
        job_id: row.get(1)?,
        started_at: parse_ts_req(row.get(2)?, 2)?,
        completed_at: parse_ts(row.get(3)?, 3)?,
        duration: row.get(4)?,
        status: parse_col(row.get::<_, String>(5)?.parse::<JobStatus>(), 5)?,
        result: row.get(6)?,
        error_message: row.get(7)?,
        stack_trace: row.get(8)?,
        worker_node: row.get(9)?,
    })
}

fn parse_col<T>(parsed: std::result::Result<T, String>, idx: usize) -> rusqlite::Result<T> {
    parsed.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_ts(raw: Option<String>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts_req(s, idx)).transpose()
}

fn parse_ts_req(raw: String, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::Duration;

    fn store() -> JobStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        JobStore::new(conn)
    }

    fn sample_job(id: &str, name: &str) -> Job {
        let now = Utc::now();
        Job {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            job_type: JobType::Custom,
            cron_expression: None,
            interval_seconds: Some(3600),
            next_run_time: Some(now + Duration::seconds(3600)),
            last_run_time: None,
            job_data: serde_json::json!({"key": "value"}),
            max_retries: 3,
            retry_count: 0,
            timeout_seconds: 60,
            status: JobStatus::Pending,
            is_active: true,
            priority: 5,
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            average_runtime: 0.0,
            created_by: "test".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_execution(job_id: &str, status: JobStatus) -> JobExecution {
        let now = Utc::now();
        JobExecution {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            started_at: now,
            completed_at: Some(now),
            duration: Some(1.5),
            status,
            result: Some("ok".to_string()),
            error_message: None,
            stack_trace: None,
            worker_node: "test-node".to_string(),
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let store = store();
        let job = sample_job("j1", "roundtrip job");
        store.insert_job(&job).unwrap();

        let loaded = store.get_job("j1").unwrap().unwrap();
        assert_eq!(loaded.name, "roundtrip job");
        assert_eq!(loaded.interval_seconds, Some(3600));
        assert_eq!(loaded.job_data, serde_json::json!({"key": "value"}));
        assert_eq!(loaded.status, JobStatus::Pending);
        assert!(loaded.next_run_time.is_some());
    }

    #[test]
    fn get_missing_job_is_none() {
        assert!(store().get_job("nope").unwrap().is_none());
    }

    #[test]
    fn update_missing_job_is_not_found() {
        let store = store();
        let job = sample_job("ghost", "ghost job");
        assert!(matches!(
            store.update_job(&job),
            Err(StoreError::JobNotFound { .. })
        ));
    }

    #[test]
    fn delete_cascades_executions() {
        let store = store();
        let job = sample_job("j1", "doomed job");
        store.insert_job(&job).unwrap();
        store
            .commit_outcome(&job, &sample_execution("j1", JobStatus::Completed))
            .unwrap();
        assert_eq!(store.list_executions("j1", 1, 10).unwrap().total, 1);

        store.delete_job("j1").unwrap();
        assert!(store.get_job("j1").unwrap().is_none());
        assert_eq!(store.list_executions("j1", 1, 10).unwrap().total, 0);
    }

    #[test]
    fn delete_missing_job_is_not_found() {
        assert!(matches!(
            store().delete_job("nope"),
            Err(StoreError::JobNotFound { .. })
        ));
    }

    #[test]
    fn list_orders_by_priority_then_creation() {
        let store = store();
        let mut low = sample_job("low", "low priority");
        low.priority = 2;
        let mut high = sample_job("high", "high priority");
        high.priority = 9;
        high.created_at = low.created_at - Duration::seconds(60);
        store.insert_job(&low).unwrap();
        store.insert_job(&high).unwrap();

        let page = store.list_jobs(&JobFilter::default(), 1, 10).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, "high");
        assert_eq!(page.items[1].id, "low");
    }

    #[test]
    fn list_filters_by_status_and_active() {
        let store = store();
        let mut paused = sample_job("p1", "paused job");
        paused.status = JobStatus::Paused;
        paused.is_active = false;
        store.insert_job(&paused).unwrap();
        store.insert_job(&sample_job("a1", "active job")).unwrap();

        let filter = JobFilter {
            status: Some(JobStatus::Paused),
            ..Default::default()
        };
        let page = store.list_jobs(&filter, 1, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "p1");

        let filter = JobFilter {
            is_active: Some(true),
            ..Default::default()
        };
        let page = store.list_jobs(&filter, 1, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "a1");
    }

    #[test]
    fn pagination_slices_and_reports_total() {
        let store = store();
        for i in 0..5 {
            store
                .insert_job(&sample_job(&format!("j{i}"), &format!("job {i}")))
                .unwrap();
        }
        let page = store.list_jobs(&JobFilter::default(), 2, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        let last = store.list_jobs(&JobFilter::default(), 3, 2).unwrap();
        assert_eq!(last.items.len(), 1);
    }

    #[test]
    fn mark_running_reports_missing_job() {
        let store = store();
        assert!(!store.mark_running("nope", Utc::now()).unwrap());

        store.insert_job(&sample_job("j1", "runnable")).unwrap();
        assert!(store.mark_running("j1", Utc::now()).unwrap());
        assert_eq!(
            store.get_job("j1").unwrap().unwrap().status,
            JobStatus::Running
        );
    }

    #[test]
    fn commit_outcome_writes_job_and_execution_atomically() {
        let store = store();
        let mut job = sample_job("j1", "stats job");
        store.insert_job(&job).unwrap();

        job.status = JobStatus::Completed;
        job.total_runs = 1;
        job.successful_runs = 1;
        job.average_runtime = 1.5;
        assert!(store
            .commit_outcome(&job, &sample_execution("j1", JobStatus::Completed))
            .unwrap());

        let loaded = store.get_job("j1").unwrap().unwrap();
        assert_eq!(loaded.total_runs, 1);
        assert_eq!(loaded.successful_runs, 1);
        assert_eq!(store.list_executions("j1", 1, 10).unwrap().total, 1);
    }

    #[test]
    fn commit_outcome_for_deleted_job_writes_nothing() {
        let store = store();
        let job = sample_job("gone", "deleted job");
        // Never inserted — simulates delete-while-firing.
        assert!(!store
            .commit_outcome(&job, &sample_execution("gone", JobStatus::Failed))
            .unwrap());
        assert_eq!(store.list_executions("gone", 1, 10).unwrap().total, 0);
    }

    #[test]
    fn schedulable_jobs_skips_inactive_and_dormant() {
        let store = store();
        store.insert_job(&sample_job("armed", "armed job")).unwrap();
        let mut dormant = sample_job("dormant", "dormant job");
        dormant.next_run_time = None;
        store.insert_job(&dormant).unwrap();
        let mut inactive = sample_job("inactive", "inactive job");
        inactive.is_active = false;
        store.insert_job(&inactive).unwrap();

        let jobs = store.schedulable_jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "armed");
    }
}

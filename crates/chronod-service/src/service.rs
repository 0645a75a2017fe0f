use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use chronod_core::{ChronodError, Result, SchedulerConfig};
use chronod_jobs::types::{Job, JobExecution, JobFilter, JobStatus, JobType, Page};
use chronod_jobs::{JobStore, StoreError};
use chronod_scheduler::SchedulerHandle;

use crate::validate;

/// Input for job creation. Unset policy fields fall back to the
/// configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub interval_seconds: Option<u32>,
    #[serde(default)]
    pub job_data: Option<serde_json::Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Whitelisted job mutations. Fields left `None` are untouched.
///
/// Setting one recurrence field switches the job to that recurrence
/// kind and clears the other; setting both is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub interval_seconds: Option<u32>,
    #[serde(default)]
    pub job_data: Option<serde_json::Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Orchestration layer keeping persisted job state and the engine's
/// trigger set in lockstep.
///
/// Ordering discipline: storage commits first, trigger mutations second.
/// A storage failure therefore never leaves the trigger set changed
/// speculatively, and the engine's pre-dispatch re-read covers the
/// window between the two steps.
pub struct JobService {
    store: Arc<JobStore>,
    scheduler: SchedulerHandle,
    defaults: SchedulerConfig,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, scheduler: SchedulerHandle, defaults: SchedulerConfig) -> Self {
        Self {
            store,
            scheduler,
            defaults,
        }
    }

    /// Validate, persist, compute the first next-run, and arm.
    pub fn create_job(&self, input: NewJob) -> Result<Job> {
        let name = validate::validate_job_name(&input.name)?;
        validate::validate_recurrence(
            input.cron_expression.as_deref(),
            input.interval_seconds,
        )?;

        let max_retries = input.max_retries.unwrap_or(self.defaults.default_max_retries);
        validate::validate_max_retries(max_retries)?;
        let timeout_seconds = input
            .timeout_seconds
            .unwrap_or(self.defaults.default_timeout_seconds);
        validate::validate_timeout_seconds(timeout_seconds)?;
        let priority = input.priority.unwrap_or(self.defaults.default_priority);
        validate::validate_priority(priority)?;

        let now = Utc::now();
        let next_run_time = chronod_trigger::next_run_for(
            input.cron_expression.as_deref(),
            input.interval_seconds,
            now,
        );

        let job = Job {
            id: Uuid::new_v4().to_string(),
            name,
            description: input.description.unwrap_or_default(),
            job_type: input.job_type.unwrap_or(JobType::Custom),
            cron_expression: input.cron_expression,
            interval_seconds: input.interval_seconds,
            next_run_time,
            last_run_time: None,
            job_data: input.job_data.unwrap_or_else(|| serde_json::json!({})),
            max_retries,
            retry_count: 0,
            timeout_seconds,
            status: JobStatus::Pending,
            is_active: true,
            priority,
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            average_runtime: 0.0,
            created_by: input.created_by.unwrap_or_else(|| "system".to_string()),
            created_at: now,
            updated_at: now,
        };

        self.store.insert_job(&job).map_err(store_err)?;
        if job.is_active && job.next_run_time.is_some() {
            self.scheduler.schedule_job(&job);
        }
        info!(job_id = %job.id, name = %job.name, "job created");
        Ok(job)
    }

    pub fn get_job(&self, id: &str) -> Result<Job> {
        self.store
            .get_job(id)
            .map_err(store_err)?
            .ok_or_else(|| ChronodError::JobNotFound { id: id.to_string() })
    }

    /// Filtered, paginated listing (priority desc, then creation desc).
    pub fn list_jobs(&self, filter: &JobFilter, page: u32, per_page: u32) -> Result<Page<Job>> {
        let (page, per_page) = validate::validate_pagination(page, per_page)?;
        self.store.list_jobs(filter, page, per_page).map_err(store_err)
    }

    /// Apply whitelisted mutations. A recurrence change recomputes the
    /// next run and re-arms; unrelated fields never touch the trigger.
    pub fn update_job(&self, id: &str, update: JobUpdate) -> Result<Job> {
        let mut job = self.get_job(id)?;
        let was_active = job.is_active;

        if let Some(ref name) = update.name {
            job.name = validate::validate_job_name(name)?;
        }
        if let Some(description) = update.description {
            job.description = description;
        }
        if let Some(job_data) = update.job_data {
            job.job_data = job_data;
        }
        if let Some(max_retries) = update.max_retries {
            validate::validate_max_retries(max_retries)?;
            job.max_retries = max_retries;
        }
        if let Some(timeout_seconds) = update.timeout_seconds {
            validate::validate_timeout_seconds(timeout_seconds)?;
            job.timeout_seconds = timeout_seconds;
        }
        if let Some(priority) = update.priority {
            validate::validate_priority(priority)?;
            job.priority = priority;
        }
        if let Some(is_active) = update.is_active {
            job.is_active = is_active;
        }

        let recurrence_changed = match (&update.cron_expression, update.interval_seconds) {
            (Some(_), Some(_)) => {
                return Err(ChronodError::InvalidRecurrenceSpec(
                    "cron_expression and interval_seconds are mutually exclusive".to_string(),
                ))
            }
            (Some(expr), None) => {
                validate::validate_recurrence(Some(expr), None)?;
                job.cron_expression = Some(expr.clone());
                job.interval_seconds = None;
                true
            }
            (None, Some(interval)) => {
                validate::validate_recurrence(None, Some(interval))?;
                job.interval_seconds = Some(interval);
                job.cron_expression = None;
                true
            }
            (None, None) => false,
        };

        let now = Utc::now();
        if recurrence_changed || (!was_active && job.is_active) {
            job.next_run_time = if job.is_active {
                chronod_trigger::next_run_for(
                    job.cron_expression.as_deref(),
                    job.interval_seconds,
                    now,
                )
            } else {
                None
            };
        }
        if !job.is_active {
            job.next_run_time = None;
        }
        job.updated_at = now;

        self.store.update_job(&job).map_err(store_err)?;

        // Trigger sync only after the commit succeeded.
        if !job.is_active {
            if was_active {
                self.scheduler.remove_job(&job.id);
            }
        } else if recurrence_changed || !was_active {
            self.scheduler.reschedule_job(&job);
        }

        info!(job_id = %job.id, name = %job.name, "job updated");
        Ok(job)
    }

    /// Deactivate and disarm. Statistics and retry state are untouched.
    pub fn pause_job(&self, id: &str) -> Result<Job> {
        let mut job = self.get_job(id)?;
        job.is_active = false;
        job.status = JobStatus::Paused;
        job.next_run_time = None;
        job.updated_at = Utc::now();
        self.store.update_job(&job).map_err(store_err)?;
        self.scheduler.remove_job(&job.id);
        info!(job_id = %job.id, name = %job.name, "job paused");
        Ok(job)
    }

    /// Reactivate and re-arm. The next run is recomputed from the
    /// resume moment — a stale pre-pause due time is never resurrected.
    pub fn resume_job(&self, id: &str) -> Result<Job> {
        let mut job = self.get_job(id)?;
        job.is_active = true;
        job.status = JobStatus::Pending;
        job.next_run_time = chronod_trigger::next_run_for(
            job.cron_expression.as_deref(),
            job.interval_seconds,
            Utc::now(),
        );
        job.updated_at = Utc::now();
        self.store.update_job(&job).map_err(store_err)?;
        self.scheduler.schedule_job(&job);
        info!(job_id = %job.id, name = %job.name, "job resumed");
        Ok(job)
    }

    /// Delete the job and its execution history in one transaction,
    /// then disarm. The engine re-reads before dispatch, so the brief
    /// gap between the two steps cannot fire a deleted job.
    pub fn delete_job(&self, id: &str) -> Result<()> {
        self.store.delete_job(id).map_err(store_err)?;
        self.scheduler.remove_job(id);
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    /// Execution history, newest first.
    pub fn list_executions(
        &self,
        job_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<JobExecution>> {
        let (page, per_page) = validate::validate_pagination(page, per_page)?;
        // Surface a missing job as not-found rather than an empty page.
        self.get_job(job_id)?;
        self.store
            .list_executions(job_id, page, per_page)
            .map_err(store_err)
    }
}

fn store_err(e: StoreError) -> ChronodError {
    match e {
        StoreError::JobNotFound { id } => ChronodError::JobNotFound { id },
        other => ChronodError::Database(other.to_string()),
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use chronod_jobs::types::{Job, JobExecution, JobStatus};
use chronod_jobs::{JobStore, Result};

use crate::handlers::HandlerRegistry;

/// How one handler invocation ended.
enum Outcome {
    Success(String),
    Failure(anyhow::Error),
    Timeout,
}

/// Runs one job's handler under a hard wall-clock deadline and commits
/// the resulting Job + JobExecution state in a single transaction.
///
/// Timeout abandonment is best-effort: the spawned handler task is
/// aborted, which takes effect at its next await point. A handler that
/// never awaits keeps its task alive until it finishes naturally, but
/// bookkeeping proceeds at the deadline regardless and the job is never
/// double-counted.
pub struct JobExecutor {
    store: Arc<JobStore>,
    registry: Arc<HandlerRegistry>,
    worker_node: String,
}

impl JobExecutor {
    pub fn new(store: Arc<JobStore>, registry: Arc<HandlerRegistry>) -> Self {
        let worker_node =
            std::env::var("HOSTNAME").unwrap_or_else(|_| "local".to_string());
        Self {
            store,
            registry,
            worker_node,
        }
    }

    /// Execute `job` once.
    ///
    /// Returns the committed job state and execution record, or `None`
    /// when the job was deleted before or during the run — in that case
    /// nothing is persisted and the caller should tear down the trigger.
    ///
    /// On success the next run time is recomputed from the recurrence
    /// spec anchored at completion time (a late start therefore shifts
    /// subsequent runs — intentional, matches the retry-anchor policy).
    /// On failure the retry backoff schedule applies until retries are
    /// exhausted, after which the job goes dormant.
    pub async fn execute(&self, mut job: Job) -> Result<Option<(Job, JobExecution)>> {
        let started_at = Utc::now();
        let timer = Instant::now();

        if !self.store.mark_running(&job.id, started_at)? {
            warn!(job_id = %job.id, "job deleted before execution start; skipping");
            return Ok(None);
        }
        info!(job_id = %job.id, name = %job.name, "starting execution");

        let outcome = self.run_with_deadline(&job).await;

        let completed_at = Utc::now();
        let duration = timer.elapsed().as_secs_f64();

        let mut execution = JobExecution {
            id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            started_at,
            completed_at: Some(completed_at),
            duration: Some(duration),
            status: JobStatus::Completed,
            result: None,
            error_message: None,
            stack_trace: None,
            worker_node: self.worker_node.clone(),
        };

        job.last_run_time = Some(started_at);
        job.total_runs += 1;
        job.updated_at = completed_at;

        match outcome {
            Outcome::Success(result) => {
                execution.result = Some(if result.is_empty() {
                    "Job completed successfully".to_string()
                } else {
                    result
                });

                job.status = JobStatus::Completed;
                job.successful_runs += 1;
                job.retry_count = 0;
                let n = job.total_runs as f64;
                job.average_runtime = (job.average_runtime * (n - 1.0) + duration) / n;
                job.next_run_time = chronod_trigger::next_run_for(
                    job.cron_expression.as_deref(),
                    job.interval_seconds,
                    completed_at,
                );
                info!(job_id = %job.id, name = %job.name, duration, "execution completed");
            }

            Outcome::Failure(err) => {
                execution.status = JobStatus::Failed;
                execution.error_message = Some(err.to_string());
                execution.stack_trace = Some(format!("{err:?}"));
                self.apply_failure(&mut job, completed_at);
                error!(job_id = %job.id, name = %job.name, "execution failed: {err:#}");
            }

            Outcome::Timeout => {
                execution.status = JobStatus::Failed;
                execution.error_message = Some(format!(
                    "Job execution timed out after {} seconds",
                    job.timeout_seconds
                ));
                self.apply_failure(&mut job, completed_at);
                error!(
                    job_id = %job.id, name = %job.name,
                    timeout_seconds = job.timeout_seconds,
                    "execution timed out"
                );
            }
        }

        if !self.store.commit_outcome(&job, &execution)? {
            // Deleted mid-flight; the transaction wrote nothing.
            return Ok(None);
        }
        Ok(Some((job, execution)))
    }

    /// Run the handler on its own task with `timeout_seconds` as the
    /// deadline; classify the three possible endings.
    async fn run_with_deadline(&self, job: &Job) -> Outcome {
        let handler = self.registry.resolve(job.job_type);
        let job_for_handler = job.clone();
        let mut handle =
            tokio::spawn(async move { handler.run(&job_for_handler).await });

        let deadline = Duration::from_secs(job.timeout_seconds);
        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(Ok(result))) => Outcome::Success(result),
            Ok(Ok(Err(err))) => Outcome::Failure(err),
            Ok(Err(join_err)) => {
                Outcome::Failure(anyhow::anyhow!("handler panicked: {join_err}"))
            }
            Err(_) => {
                handle.abort();
                Outcome::Timeout
            }
        }
    }

    /// Shared failure bookkeeping: retry with backoff while attempts
    /// remain, otherwise park the job until it is edited or resumed.
    fn apply_failure(&self, job: &mut Job, now: chrono::DateTime<Utc>) {
        job.failed_runs += 1;
        if job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.status = JobStatus::Pending;
            job.next_run_time = Some(chronod_trigger::next_retry_time(job.retry_count, now));
            warn!(
                job_id = %job.id, name = %job.name,
                retry = job.retry_count, max_retries = job.max_retries,
                "execution failed; retry scheduled"
            );
        } else {
            job.status = JobStatus::Failed;
            job.next_run_time = None;
            error!(
                job_id = %job.id, name = %job.name,
                max_retries = job.max_retries,
                "execution failed permanently; retries exhausted"
            );
        }
    }
}

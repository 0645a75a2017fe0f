use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job (and, for history rows, of one execution).
///
/// Stored `JobExecution` rows only ever carry `Completed` or `Failed`;
/// the transient states belong to the `Job` record alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next_run_time.
    Pending,
    /// An executor call is in flight.
    Running,
    /// Last execution finished successfully.
    Completed,
    /// Last execution failed with no retries remaining.
    Failed,
    /// Deactivated by the caller; trigger disarmed.
    Paused,
    /// Terminal administrative state (set by an API layer, never by the core).
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Paused => "paused",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "paused" => Ok(JobStatus::Paused),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Closed set of job types, each mapped to one handler at startup.
///
/// Unknown type strings deserialize to `Custom`, which routes to the
/// default handler rather than failing validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    EmailNotification,
    DataProcessing,
    ReportGeneration,
    CleanupTask,
    BackupTask,
    #[serde(other)]
    Custom,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobType::EmailNotification => "email_notification",
            JobType::DataProcessing => "data_processing",
            JobType::ReportGeneration => "report_generation",
            JobType::CleanupTask => "cleanup_task",
            JobType::BackupTask => "backup_task",
            JobType::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "email_notification" => Ok(JobType::EmailNotification),
            "data_processing" => Ok(JobType::DataProcessing),
            "report_generation" => Ok(JobType::ReportGeneration),
            "cleanup_task" => Ok(JobType::CleanupTask),
            "backup_task" => Ok(JobType::BackupTask),
            "custom" => Ok(JobType::Custom),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

/// A persisted recurring unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// UUID v4 string — primary key, immutable.
    pub id: String,
    /// Human-readable label, 3–255 chars.
    pub name: String,
    pub description: String,
    pub job_type: JobType,
    /// 5-field cron expression. Mutually exclusive with `interval_seconds`.
    pub cron_expression: Option<String>,
    /// Fixed recurrence interval. Mutually exclusive with `cron_expression`.
    pub interval_seconds: Option<u32>,
    /// Set iff the job is active and schedulable (fresh schedule or
    /// retries remaining).
    pub next_run_time: Option<DateTime<Utc>>,
    /// Start time of the most recent execution, if any.
    pub last_run_time: Option<DateTime<Utc>>,
    /// Opaque payload forwarded verbatim to the handler.
    pub job_data: serde_json::Value,
    pub max_retries: u32,
    /// Consecutive-failure counter; resets to 0 on success. Never
    /// exceeds `max_retries`.
    pub retry_count: u32,
    /// Hard wall-clock deadline per execution.
    pub timeout_seconds: u64,
    pub status: JobStatus,
    /// Scheduling gate, independent of `status`.
    pub is_active: bool,
    /// 1–10; listing order only, never scheduling preemption.
    pub priority: u8,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Running average execution duration in seconds, updated
    /// incrementally after each run.
    pub average_runtime: f64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// True when the recurrence spec can produce a next run time.
    pub fn has_recurrence(&self) -> bool {
        self.cron_expression.is_some() || self.interval_seconds.is_some()
    }
}

/// One historical run record. Always terminal once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    /// UUID v4 string — primary key.
    pub id: String,
    /// Owning job; rows are deleted together with the job.
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds.
    pub duration: Option<f64>,
    /// `Completed` or `Failed` — never a transient state.
    pub status: JobStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
    /// Error chain rendered at failure time.
    pub stack_trace: Option<String>,
    /// Identifier of the worker that ran it.
    pub worker_node: String,
}

/// Filter for paginated job listings. All fields are AND-combined.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub created_by: Option<String>,
    pub is_active: Option<bool>,
}

/// One page of a filtered listing plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::info;

use chronod_jobs::types::{Job, JobType};

/// One executable unit of business logic, dispatched by job type.
///
/// Handlers receive the full job (payload included) and return a result
/// string on success. Errors and panics are classified by the executor;
/// handlers never touch job state themselves.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> anyhow::Result<String>;
}

/// Static mapping from job type to handler, built once at startup.
///
/// Unregistered types resolve to the fallback handler rather than
/// failing, so payload validation stays a creation-time concern.
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    fallback: Arc<dyn JobHandler>,
}

impl HandlerRegistry {
    /// Registry with the built-in handler set and the custom handler as
    /// fallback.
    pub fn builtin() -> Self {
        let mut handlers: HashMap<JobType, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert(JobType::EmailNotification, Arc::new(EmailNotificationHandler));
        handlers.insert(JobType::DataProcessing, Arc::new(DataProcessingHandler));
        handlers.insert(JobType::ReportGeneration, Arc::new(ReportGenerationHandler));
        handlers.insert(JobType::CleanupTask, Arc::new(CleanupTaskHandler));
        handlers.insert(JobType::BackupTask, Arc::new(BackupTaskHandler));
        handlers.insert(JobType::Custom, Arc::new(CustomJobHandler));
        Self {
            handlers,
            fallback: Arc::new(CustomJobHandler),
        }
    }

    /// Empty registry where every type resolves to `fallback`. Useful
    /// for embedding with a caller-supplied handler set.
    pub fn with_fallback(fallback: Arc<dyn JobHandler>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    /// Register (or replace) the handler for one job type.
    pub fn register(mut self, job_type: JobType, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job_type, handler);
        self
    }

    pub fn resolve(&self, job_type: JobType) -> Arc<dyn JobHandler> {
        self.handlers
            .get(&job_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

fn str_field<'a>(data: &'a Value, key: &str, default: &'a str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn u64_field(data: &Value, key: &str, default: u64) -> u64 {
    data.get(key).and_then(Value::as_u64).unwrap_or(default)
}

/// Simulated email delivery. A real deployment would integrate an email
/// provider here; the simulation keeps the execution path and payload
/// contract.
struct EmailNotificationHandler;

#[async_trait]
impl JobHandler for EmailNotificationHandler {
    async fn run(&self, job: &Job) -> anyhow::Result<String> {
        let recipient = str_field(&job.job_data, "recipient", "user@example.com");
        let subject = str_field(&job.job_data, "subject", "Notification");
        info!(job_id = %job.id, %recipient, %subject, "sending email");
        sleep(Duration::from_millis(200)).await;
        Ok(format!("Email sent successfully to {recipient}"))
    }
}

struct DataProcessingHandler;

#[async_trait]
impl JobHandler for DataProcessingHandler {
    async fn run(&self, job: &Job) -> anyhow::Result<String> {
        let dataset = str_field(&job.job_data, "dataset", "default_dataset");
        let operation = str_field(&job.job_data, "operation", "analyze");
        let records = u64_field(&job.job_data, "record_count", 1000);
        info!(job_id = %job.id, %dataset, %operation, records, "processing dataset");
        // 1 ms per 1000 records, capped.
        sleep(Duration::from_millis((records / 1000).min(1000))).await;
        Ok(format!("Processed {records} records from {dataset}"))
    }
}

struct ReportGenerationHandler;

#[async_trait]
impl JobHandler for ReportGenerationHandler {
    async fn run(&self, job: &Job) -> anyhow::Result<String> {
        let report_type = str_field(&job.job_data, "report_type", "summary");
        let date_range = str_field(&job.job_data, "date_range", "last_week");
        let format = str_field(&job.job_data, "format", "pdf");
        info!(job_id = %job.id, %report_type, %date_range, "generating report");
        sleep(Duration::from_millis(300)).await;
        Ok(format!(
            "Report generated successfully: /reports/{report_type}_{date_range}.{format}"
        ))
    }
}

struct CleanupTaskHandler;

#[async_trait]
impl JobHandler for CleanupTaskHandler {
    async fn run(&self, job: &Job) -> anyhow::Result<String> {
        let cleanup_type = str_field(&job.job_data, "cleanup_type", "temp_files");
        let retention_days = u64_field(&job.job_data, "retention_days", 7);
        info!(job_id = %job.id, %cleanup_type, retention_days, "running cleanup");
        sleep(Duration::from_millis(200)).await;
        let files = u64_field(&job.job_data, "estimated_files", 100);
        let space_mb = u64_field(&job.job_data, "estimated_space_mb", 500);
        Ok(format!(
            "Cleanup completed: {files} files removed, {space_mb}MB freed"
        ))
    }
}

struct BackupTaskHandler;

#[async_trait]
impl JobHandler for BackupTaskHandler {
    async fn run(&self, job: &Job) -> anyhow::Result<String> {
        let backup_type = str_field(&job.job_data, "backup_type", "database");
        let destination = str_field(&job.job_data, "destination", "s3://backups/");
        info!(job_id = %job.id, %backup_type, %destination, "running backup");
        sleep(Duration::from_millis(300)).await;
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        Ok(format!(
            "Backup completed: {backup_type}_backup_{stamp} stored at {destination}"
        ))
    }
}

/// Fallback for the `custom` type and any unregistered type.
struct CustomJobHandler;

#[async_trait]
impl JobHandler for CustomJobHandler {
    async fn run(&self, job: &Job) -> anyhow::Result<String> {
        let operation = str_field(&job.job_data, "operation", "default");
        info!(job_id = %job.id, %operation, "executing custom job");
        let millis = u64_field(&job.job_data, "duration_ms", 100).min(30_000);
        sleep(Duration::from_millis(millis)).await;
        Ok(format!("Custom job completed: {operation}"))
    }
}

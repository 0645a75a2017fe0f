use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use chronod_core::SchedulerConfig;
use chronod_executor::JobExecutor;
use chronod_jobs::types::Job;
use chronod_jobs::JobStore;

/// How long shutdown waits for in-flight executions before giving up.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Shared handle for trigger management while the engine loop runs.
///
/// The trigger map is shared with the engine, so arming and disarming
/// from the service layer takes effect on the next tick without any
/// cross-task signalling.
#[derive(Clone)]
pub struct SchedulerHandle {
    triggers: Arc<DashMap<String, DateTime<Utc>>>,
}

impl SchedulerHandle {
    /// Arm (or replace) the trigger for `job`.
    ///
    /// Idempotent: an existing trigger for the same job ID is swapped
    /// out atomically, so a recurrence change never leaves a stale and
    /// a fresh trigger coexisting. Jobs without a resolvable next run
    /// are skipped with a warning rather than ever panicking the engine.
    pub fn schedule_job(&self, job: &Job) {
        if !job.is_active {
            warn!(job_id = %job.id, name = %job.name, "job is inactive; not arming");
            return;
        }
        let Some(next) = job.next_run_time else {
            warn!(job_id = %job.id, name = %job.name, "no resolvable next run; not arming");
            return;
        };
        self.triggers.insert(job.id.clone(), next);
        debug!(job_id = %job.id, next_run = %next, "trigger armed");
    }

    /// Re-arm after a recurrence-spec mutation. Same contract as
    /// [`schedule_job`](Self::schedule_job); named for the call sites.
    pub fn reschedule_job(&self, job: &Job) {
        self.schedule_job(job);
    }

    /// Disarm the trigger for `job_id`. Removing an absent trigger is
    /// not an error.
    pub fn remove_job(&self, job_id: &str) {
        if self.triggers.remove(job_id).is_some() {
            debug!(job_id = %job_id, "trigger disarmed");
        }
    }

    /// Number of armed triggers.
    pub fn armed_count(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_armed(&self, job_id: &str) -> bool {
        self.triggers.contains_key(job_id)
    }
}

/// Clock-driven dispatcher: matches armed triggers against wall-clock
/// time and fires due jobs into a bounded execution pool.
///
/// One engine instance owns the loop; at most one execution per job ID
/// is in flight at any time, and overlapping fires for the same job are
/// coalesced into no-ops.
pub struct SchedulerEngine {
    store: Arc<JobStore>,
    executor: Arc<JobExecutor>,
    triggers: Arc<DashMap<String, DateTime<Utc>>>,
    in_flight: Arc<DashMap<String, ()>>,
    pool: Arc<Semaphore>,
    tick_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(store: Arc<JobStore>, executor: Arc<JobExecutor>, config: &SchedulerConfig) -> Self {
        Self {
            store,
            executor,
            triggers: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            pool: Arc::new(Semaphore::new(config.max_concurrent_executions)),
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
        }
    }

    /// Management handle sharing this engine's trigger map.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            triggers: self.triggers.clone(),
        }
    }

    /// Main event loop. Ticks until `shutdown` broadcasts `true`, then
    /// drains in-flight executions.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        self.restore_triggers();

        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
        self.drain().await;
    }

    /// Re-arm triggers for persisted active jobs. Jobs whose due time
    /// passed while the process was down fire on the first tick
    /// (at-least-once posture).
    fn restore_triggers(&self) {
        match self.store.schedulable_jobs() {
            Ok(jobs) => {
                for job in &jobs {
                    if let Some(next) = job.next_run_time {
                        self.triggers.insert(job.id.clone(), next);
                    }
                }
                info!(count = jobs.len(), "triggers restored from store");
            }
            Err(e) => error!("trigger restore failed: {e}"),
        }
    }

    /// Fire every armed trigger whose due time has arrived.
    fn tick(&self) {
        let now = Utc::now();
        let due: Vec<String> = self
            .triggers
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| entry.key().clone())
            .collect();

        for job_id in due {
            self.fire(job_id);
        }
    }

    /// Dispatch one due job, re-validating persisted state first.
    ///
    /// A failure anywhere in this path marks the job failed and tears
    /// its trigger down; it never takes the loop down with it.
    fn fire(&self, job_id: String) {
        // At-most-one-concurrent-execution-per-job: a fire that overlaps
        // an in-flight run is coalesced into a no-op.
        if self.in_flight.contains_key(&job_id) {
            debug!(job_id = %job_id, "execution already in flight; fire coalesced");
            return;
        }

        // Re-read persisted state immediately before dispatch. A stale
        // trigger must not fire a job that was deleted or paused since
        // arming.
        let job = match self.store.get_job(&job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id = %job_id, "armed job no longer exists; trigger torn down");
                self.triggers.remove(&job_id);
                return;
            }
            Err(e) => {
                error!(job_id = %job_id, "dispatch failed: {e}");
                self.fail_dispatch(&job_id);
                return;
            }
        };
        if !job.is_active {
            warn!(job_id = %job_id, "job deactivated since arming; fire skipped");
            self.triggers.remove(&job_id);
            return;
        }

        self.in_flight.insert(job_id.clone(), ());

        let store = self.store.clone();
        let executor = self.executor.clone();
        let triggers = self.triggers.clone();
        let in_flight = self.in_flight.clone();
        let pool = self.pool.clone();

        tokio::spawn(async move {
            // Pool-wide concurrency cap; the dispatch itself never blocks
            // the tick loop on this.
            let _permit = pool.acquire_owned().await.expect("execution pool closed");

            match executor.execute(job).await {
                Ok(Some((job, _execution))) => {
                    // Rearm from the committed state, re-reading the
                    // activation flag so a pause during the run is not
                    // overwritten by a stale rearm.
                    match store.get_job(&job.id) {
                        Ok(Some(persisted)) if persisted.is_active => {
                            match persisted.next_run_time {
                                Some(next) => {
                                    triggers.insert(job.id.clone(), next);
                                }
                                None => {
                                    triggers.remove(&job.id);
                                }
                            }
                        }
                        _ => {
                            triggers.remove(&job.id);
                        }
                    }
                }
                Ok(None) => {
                    // Job vanished before or during the run.
                    triggers.remove(&job_id);
                }
                Err(e) => {
                    error!(job_id = %job_id, "execution bookkeeping failed: {e}");
                    if let Err(e) = store.mark_dispatch_failed(&job_id, Utc::now()) {
                        error!(job_id = %job_id, "failed to record dispatch failure: {e}");
                    }
                    triggers.remove(&job_id);
                }
            }

            in_flight.remove(&job_id);
        });
    }

    /// Best-effort bookkeeping for a synchronous dispatch failure.
    fn fail_dispatch(&self, job_id: &str) {
        if let Err(e) = self.store.mark_dispatch_failed(job_id, Utc::now()) {
            error!(job_id = %job_id, "failed to record dispatch failure: {e}");
        }
        self.triggers.remove(job_id);
    }

    /// Wait for in-flight executions to finish, bounded by
    /// [`DRAIN_TIMEOUT`].
    async fn drain(&self) {
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while !self.in_flight.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.in_flight.len(),
                    "drain timed out; abandoning in-flight executions"
                );
                return;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        info!("in-flight executions drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use chronod_executor::{HandlerRegistry, JobHandler};
    use chronod_jobs::db::init_db;
    use chronod_jobs::types::{JobStatus, JobType};
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn store() -> Arc<JobStore> {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        Arc::new(JobStore::new(conn))
    }

    fn due_job(id: &str) -> Job {
        let now = Utc::now();
        Job {
            id: id.to_string(),
            name: format!("job {id}"),
            description: String::new(),
            job_type: JobType::Custom,
            cron_expression: None,
            interval_seconds: Some(3600),
            next_run_time: Some(now - ChronoDuration::seconds(1)),
            last_run_time: None,
            job_data: serde_json::json!({}),
            max_retries: 0,
            retry_count: 0,
            timeout_seconds: 30,
            status: JobStatus::Pending,
            is_active: true,
            priority: 5,
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            average_runtime: 0.0,
            created_by: "test".into(),
            created_at: now,
            updated_at: now,
        }
    }

    struct CountingHandler {
        calls: Arc<AtomicU32>,
        delay_ms: u64,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _job: &Job) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok("counted".to_string())
        }
    }

    struct FailHandler;

    #[async_trait]
    impl JobHandler for FailHandler {
        async fn run(&self, _job: &Job) -> anyhow::Result<String> {
            anyhow::bail!("boom")
        }
    }

    fn engine_with(store: Arc<JobStore>, handler: Arc<dyn JobHandler>) -> SchedulerEngine {
        let registry = Arc::new(HandlerRegistry::with_fallback(handler));
        let executor = Arc::new(JobExecutor::new(store.clone(), registry));
        SchedulerEngine::new(store, executor, &SchedulerConfig::default())
    }

    async fn wait_idle(engine: &SchedulerEngine) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !engine.in_flight.is_empty() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "in-flight executions did not settle"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn overlapping_fires_are_coalesced() {
        let store = store();
        let job = due_job("j1");
        store.insert_job(&job).unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            store,
            Arc::new(CountingHandler {
                calls: calls.clone(),
                delay_ms: 300,
            }),
        );
        engine.handle().schedule_job(&job);

        engine.tick();
        engine.tick(); // still in flight — must be a no-op
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.tick();
        wait_idle(&engine).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn successful_run_rearms_with_new_due_time() {
        let store = store();
        let job = due_job("j1");
        store.insert_job(&job).unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            store.clone(),
            Arc::new(CountingHandler {
                calls,
                delay_ms: 10,
            }),
        );
        engine.handle().schedule_job(&job);

        engine.tick();
        wait_idle(&engine).await;

        let handle = engine.handle();
        assert!(handle.is_armed("j1"));
        // Interval job: the new due time is in the future.
        let next = *engine.triggers.get("j1").unwrap().value();
        assert!(next > Utc::now());
        assert_eq!(
            store.get_job("j1").unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn exhausted_retries_unarm_the_trigger() {
        let store = store();
        let job = due_job("j1"); // max_retries = 0
        store.insert_job(&job).unwrap();

        let engine = engine_with(store.clone(), Arc::new(FailHandler));
        engine.handle().schedule_job(&job);

        engine.tick();
        wait_idle(&engine).await;

        assert!(!engine.handle().is_armed("j1"));
        let persisted = store.get_job("j1").unwrap().unwrap();
        assert_eq!(persisted.status, JobStatus::Failed);
        assert!(persisted.next_run_time.is_none());
    }

    #[tokio::test]
    async fn deactivated_job_is_skipped_and_torn_down() {
        let store = store();
        let mut job = due_job("j1");
        store.insert_job(&job).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            store.clone(),
            Arc::new(CountingHandler {
                calls: calls.clone(),
                delay_ms: 10,
            }),
        );
        engine.handle().schedule_job(&job);

        // Deactivate behind the engine's back, leaving the trigger armed.
        job.is_active = false;
        job.status = JobStatus::Paused;
        job.next_run_time = None;
        store.update_job(&job).unwrap();

        engine.tick();
        wait_idle(&engine).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!engine.handle().is_armed("j1"));
    }

    #[tokio::test]
    async fn trigger_for_deleted_job_is_torn_down() {
        let store = store();
        let job = due_job("ghost"); // never inserted
        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            store,
            Arc::new(CountingHandler {
                calls: calls.clone(),
                delay_ms: 10,
            }),
        );
        engine.triggers.insert("ghost".into(), job.next_run_time.unwrap());

        engine.tick();
        wait_idle(&engine).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!engine.handle().is_armed("ghost"));
    }

    #[tokio::test]
    async fn pause_during_flight_does_not_resurrect_trigger() {
        let store = store();
        let job = due_job("j1");
        store.insert_job(&job).unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let engine = engine_with(
            store.clone(),
            Arc::new(CountingHandler {
                calls,
                delay_ms: 300,
            }),
        );
        let handle = engine.handle();
        handle.schedule_job(&job);
        engine.tick();

        // Pause while the run is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut paused = store.get_job("j1").unwrap().unwrap();
        paused.is_active = false;
        paused.status = JobStatus::Paused;
        paused.next_run_time = None;
        store.update_job(&paused).unwrap();
        handle.remove_job("j1");

        wait_idle(&engine).await;
        assert!(!handle.is_armed("j1"));
    }

    #[tokio::test]
    async fn schedule_job_is_idempotent() {
        let store = store();
        let job = due_job("j1");
        let engine = engine_with(store, Arc::new(FailHandler));
        let handle = engine.handle();

        handle.schedule_job(&job);
        handle.schedule_job(&job);
        handle.reschedule_job(&job);
        assert_eq!(handle.armed_count(), 1);

        handle.remove_job("j1");
        handle.remove_job("j1"); // absent — not an error
        assert_eq!(handle.armed_count(), 0);
    }

    #[tokio::test]
    async fn unschedulable_job_is_not_armed() {
        let store = store();
        let mut job = due_job("j1");
        job.next_run_time = None;
        let engine = engine_with(store, Arc::new(FailHandler));
        engine.handle().schedule_job(&job);
        assert_eq!(engine.handle().armed_count(), 0);
    }

    #[tokio::test]
    async fn restore_arms_persisted_schedulable_jobs() {
        let store = store();
        store.insert_job(&due_job("j1")).unwrap();
        let mut dormant = due_job("j2");
        dormant.next_run_time = None;
        store.insert_job(&dormant).unwrap();

        let engine = engine_with(store, Arc::new(FailHandler));
        engine.restore_triggers();
        assert!(engine.handle().is_armed("j1"));
        assert!(!engine.handle().is_armed("j2"));
    }
}

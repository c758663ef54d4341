use super::context::JobContext;
use super::job::{BackgroundJob, HookEvent, JobError};
use crate::server::metrics;
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Upper bound of a single scheduler sleep.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Sleep bound while jobs are running, so finished jobs get rescheduled.
const RUNNING_POLL: Duration = Duration::from_millis(100);

/// Runs periodic jobs on their schedules.
pub struct JobScheduler {
    jobs: HashMap<&'static str, Arc<dyn BackgroundJob>>,

    /// Next scheduled run of each job that has a time-based schedule.
    next_runs: HashMap<&'static str, DateTime<Local>>,

    /// Currently running jobs with their task handles.
    running_handles: HashMap<&'static str, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<&'static str, CancellationToken>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(shutdown_token: CancellationToken, job_context: JobContext) -> Self {
        Self {
            jobs: HashMap::new(),
            next_runs: HashMap::new(),
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id();
        info!("Registering job: {} - {}", job_id, job.description());
        if let Some(next) = job.schedule().next_run_after(&Local::now()) {
            debug!("Job {} first runs at {}", job_id, next);
            self.next_runs.insert(job_id, next);
        }
        self.jobs.insert(job_id, job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn next_run(&self, job_id: &str) -> Option<DateTime<Local>> {
        self.next_runs.get(job_id).copied()
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.running_handles.contains_key(job_id)
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        info!(
            "Starting job scheduler with {} registered jobs",
            self.job_count()
        );

        self.trigger_jobs_for_hook(HookEvent::OnStartup);

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job();
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs();
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    fn time_until_next_scheduled_job(&self) -> Duration {
        let now = Local::now();
        let next = self
            .next_runs
            .iter()
            .filter(|(job_id, _)| !self.is_running(job_id))
            .map(|(_, next)| (*next - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(MAX_SLEEP)
            .min(MAX_SLEEP);
        if self.running_handles.is_empty() {
            next
        } else {
            next.min(RUNNING_POLL)
        }
    }

    fn run_due_jobs(&mut self) {
        let now = Local::now();
        let due: Vec<&'static str> = self
            .next_runs
            .iter()
            .filter(|(job_id, next)| **next <= now && !self.is_running(job_id))
            .map(|(job_id, _)| *job_id)
            .collect();

        for job_id in due {
            self.spawn_job(job_id, "schedule");
        }
    }

    fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let listening: Vec<&'static str> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.schedule().listens_to(event))
            .map(|(job_id, _)| *job_id)
            .collect();

        for job_id in listening {
            if self.is_running(job_id) {
                debug!("Skipping hook trigger for already running job: {}", job_id);
                continue;
            }
            self.spawn_job(job_id, &format!("hook:{}", event));
        }
    }

    fn spawn_job(&mut self, job_id: &'static str, triggered_by: &str) {
        let Some(job) = self.jobs.get(job_id).cloned() else {
            error!("Attempted to spawn unknown job: {}", job_id);
            return;
        };
        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        // Reschedule before running so a slow job is not picked up again.
        match job.schedule().next_run_after(&Local::now()) {
            Some(next) => {
                self.next_runs.insert(job_id, next);
            }
            None => {
                self.next_runs.remove(job_id);
            }
        }

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens.insert(job_id, cancel_token.clone());
        let ctx = self.job_context.with_token(cancel_token);

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let outcome = match result {
                Ok(Ok(())) => {
                    info!("Job {} completed successfully in {:?}", job_id, elapsed);
                    "success"
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id, elapsed);
                    "cancelled"
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
                    "failed"
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id, elapsed, e);
                    "panic"
                }
            };
            metrics::record_job(job_id, outcome, elapsed);
        });

        self.running_handles.insert(job_id, handle);
    }

    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<&'static str> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| *job_id)
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(job_id);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        for (job_id, token) in &self.job_cancel_tokens {
            debug!("Cancelling job: {}", job_id);
            token.cancel();
        }

        for (job_id, handle) in self.running_handles.drain() {
            debug!("Waiting for job {} to finish", job_id);
            let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::job::JobSchedule;
    use crate::queue_store::SqliteQueueStore;
    use crate::tasks::{DispatcherConfig, SqliteJobStore, TaskDispatcher};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        id: &'static str,
        schedule: JobSchedule,
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    impl BackgroundJob for CountingJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn description(&self) -> &'static str {
            "Counts its runs"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule.clone()
        }

        fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(JobError::ExecutionFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn test_scheduler() -> (JobScheduler, CancellationToken) {
        let queue = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let dispatcher = Arc::new(TaskDispatcher::new(
            jobs.clone(),
            queue.clone(),
            queue,
            DispatcherConfig::default(),
        ));
        let shutdown = CancellationToken::new();
        let ctx = JobContext::new(shutdown.child_token(), dispatcher, jobs);
        (JobScheduler::new(shutdown.clone(), ctx), shutdown)
    }

    fn counting(id: &'static str, schedule: JobSchedule, fail: bool) -> (Arc<CountingJob>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(CountingJob {
            id,
            schedule,
            runs: runs.clone(),
            fail,
        });
        (job, runs)
    }

    fn hourly(hooks: Vec<HookEvent>) -> JobSchedule {
        JobSchedule::Every {
            interval: Duration::from_secs(3600),
            hooks,
        }
    }

    #[tokio::test]
    async fn test_register_job_computes_next_run() {
        let (mut scheduler, _) = test_scheduler();
        let (interval, _) = counting("interval", hourly(vec![]), false);
        scheduler.register_job(interval);

        assert_eq!(scheduler.job_count(), 1);
        let next = scheduler.next_run("interval").unwrap();
        assert!(next > Local::now() + chrono::Duration::minutes(59));
        assert!(scheduler.next_run("missing").is_none());
    }

    #[tokio::test]
    async fn test_startup_hook_runs_job() {
        let (mut scheduler, shutdown) = test_scheduler();
        let (job, runs) = counting("startup", hourly(vec![HookEvent::OnStartup]), false);
        scheduler.register_job(job);

        let handle = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_failing_job_does_not_stop_scheduler() {
        let (mut scheduler, shutdown) = test_scheduler();
        let (failing, failing_runs) = counting(
            "failing",
            JobSchedule::Every {
                interval: Duration::from_millis(50),
                hooks: vec![],
            },
            true,
        );
        scheduler.register_job(failing);

        let handle = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(failing_runs.load(Ordering::SeqCst) >= 2);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

use super::job_store::JobStore;
use super::models::{Job, JobKind, NewJob};
use crate::error::JukeboxResult;
use crate::queue_store::{MediaItem, MediaStore, QueueEntry, QueueStore};
use crate::server::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs claimed jobs of one kind.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn execute(&self, job: &Job) -> JukeboxResult<()>;
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub use_normalize: bool,
    pub poll_interval: Duration,
    pub fetch_workers: usize,
    pub normalize_workers: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            use_normalize: false,
            poll_interval: Duration::from_secs(5),
            fetch_workers: 2,
            normalize_workers: 1,
        }
    }
}

/// Submits and runs media preparation work.
pub struct TaskDispatcher {
    job_store: Arc<dyn JobStore>,
    queue_store: Arc<dyn QueueStore>,
    media_store: Arc<dyn MediaStore>,
    config: DispatcherConfig,
    fetch_wakeup: Notify,
    normalize_wakeup: Notify,
    report_wakeup: Notify,
}

impl TaskDispatcher {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        queue_store: Arc<dyn QueueStore>,
        media_store: Arc<dyn MediaStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            job_store,
            queue_store,
            media_store,
            config,
            fetch_wakeup: Notify::new(),
            normalize_wakeup: Notify::new(),
            report_wakeup: Notify::new(),
        }
    }

    pub fn job_store(&self) -> &Arc<dyn JobStore> {
        &self.job_store
    }

    fn wakeup(&self, kind: JobKind) -> &Notify {
        match kind {
            JobKind::Fetch => &self.fetch_wakeup,
            JobKind::Normalize => &self.normalize_wakeup,
            JobKind::Report => &self.report_wakeup,
        }
    }

    fn workers_for(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Fetch => self.config.fetch_workers.max(1),
            JobKind::Normalize => self.config.normalize_workers.max(1),
            JobKind::Report => 1,
        }
    }

    fn submitted(&self, job: Option<Job>) -> Option<Job> {
        if let Some(job) = &job {
            debug!("Submitted {} job {}", job.kind, job.id);
            self.wakeup(job.kind).notify_one();
        }
        job
    }

    /// Makes sure the media behind `entry` gets downloaded.
    ///
    /// Prepared media only flips the entry to ready. Otherwise a fetch job is
    /// submitted unless one is already in flight for the same media, in which
    /// case that job will mark this entry ready too.
    pub fn ensure_fetch(&self, media: &MediaItem, entry: &QueueEntry) -> JukeboxResult<Option<Job>> {
        if media.is_prepared() {
            self.queue_store.mark_ready(entry.id)?;
            return Ok(None);
        }

        let job = self
            .job_store
            .submit_unless_in_flight(NewJob::fetch(&media.id, entry.id, &entry.channel))?;
        if job.is_none() {
            // The in-flight job may already be past its readiness sweep.
            if let Some(current) = self.media_store.get_media(&media.id)? {
                if current.is_prepared() {
                    self.queue_store.mark_ready(entry.id)?;
                }
            }
        }
        Ok(self.submitted(job))
    }

    pub fn ensure_normalize(&self, media: &MediaItem) -> JukeboxResult<Option<Job>> {
        if !self.config.use_normalize {
            return Ok(None);
        }
        if media.has_normalized {
            debug!("Media {} is already normalized", media.id);
            return Ok(None);
        }
        let job = self
            .job_store
            .submit_unless_in_flight(NewJob::normalize(&media.id))?;
        Ok(self.submitted(job))
    }

    pub fn submit_report(&self, channel: &str) -> JukeboxResult<Option<Job>> {
        let job = self
            .job_store
            .submit_unless_in_flight(NewJob::report(channel))?;
        Ok(self.submitted(job))
    }

    /// Requeues interrupted jobs and spawns the worker loops.
    pub fn start(
        self: &Arc<Self>,
        executors: Vec<Arc<dyn JobExecutor>>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        match self.job_store.requeue_active() {
            Ok(0) => {}
            Ok(count) => info!("Requeued {} jobs interrupted by the previous run", count),
            Err(e) => error!("Failed to requeue interrupted jobs: {}", e),
        }

        let mut handles = Vec::new();
        for executor in executors {
            let kind = executor.kind();
            let workers = self.workers_for(kind);
            info!("Starting {} {} worker(s)", workers, kind);
            for _ in 0..workers {
                let dispatcher = Arc::clone(self);
                let executor = Arc::clone(&executor);
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    dispatcher.run_worker(executor, cancel).await;
                }));
            }
        }
        handles
    }

    async fn run_worker(&self, executor: Arc<dyn JobExecutor>, cancel: CancellationToken) {
        let kind = executor.kind();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.job_store.claim_next(kind) {
                Ok(Some(job)) => {
                    self.run_job(executor.as_ref(), job).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!("Failed to claim {} job: {}", kind, e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wakeup(kind).notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        debug!("{} worker stopped", kind);
    }

    async fn run_job(&self, executor: &dyn JobExecutor, job: Job) {
        let start = Instant::now();
        let result = executor.execute(&job).await;
        let elapsed = start.elapsed();

        let outcome = match result {
            Ok(()) => {
                info!("{} job {} succeeded in {:?}", job.kind, job.id, elapsed);
                if let Err(e) = self.job_store.mark_succeeded(&job.id) {
                    error!("Failed to record success of job {}: {}", job.id, e);
                }
                "success"
            }
            Err(e) => {
                warn!("{} job {} failed after {:?}: {}", job.kind, job.id, elapsed, e);
                if let Err(e) = self.job_store.mark_failed(&job.id, &e.to_string()) {
                    error!("Failed to record failure of job {}: {}", job.id, e);
                }
                "failed"
            }
        };
        metrics::record_job(job.kind.as_db_str(), outcome, elapsed);
    }
}

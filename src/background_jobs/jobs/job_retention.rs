//! Job retention background job.
//!
//! Succeeded fetch jobs are dropped right away; finished normalize and report
//! jobs are kept for the retention period. Failed fetch jobs stay for
//! inspection.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::tasks::{JobKind, JobStatus};
use std::time::Duration;
use tracing::info;

pub struct JobRetentionJob {
    retention: Duration,
    interval: Duration,
}

impl JobRetentionJob {
    pub fn new(retention: Duration, interval: Duration) -> Self {
        Self {
            retention,
            interval,
        }
    }
}

impl BackgroundJob for JobRetentionJob {
    fn id(&self) -> &'static str {
        "job_retention"
    }

    fn description(&self) -> &'static str {
        "Delete finished task records past their retention"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Every {
            interval: self.interval,
            hooks: vec![HookEvent::OnStartup],
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let now = chrono::Utc::now().timestamp();
        let cutoff = now - self.retention.as_secs() as i64;
        let finished = [JobStatus::Succeeded, JobStatus::Failed];

        let plan: [(JobKind, &[JobStatus], i64); 3] = [
            (JobKind::Fetch, &[JobStatus::Succeeded], now + 1),
            (JobKind::Normalize, &finished, cutoff),
            (JobKind::Report, &finished, cutoff),
        ];

        let mut deleted = 0;
        for (kind, statuses, finished_before) in plan {
            deleted += ctx
                .job_store
                .prune(kind, statuses, finished_before)
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        }

        if deleted > 0 {
            info!("Deleted {} finished job records", deleted);
        } else {
            info!("No job records to clean up");
        }
        Ok(())
    }
}

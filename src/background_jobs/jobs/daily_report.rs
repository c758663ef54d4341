//! Submits the daily played-titles report of every configured channel.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, DailyAt, JobError, JobSchedule},
};
use tracing::{debug, info, warn};

pub struct DailyReportJob {
    channels: Vec<String>,
    at: DailyAt,
}

impl DailyReportJob {
    pub fn new(channels: Vec<String>, at: DailyAt) -> Self {
        Self { channels, at }
    }
}

impl BackgroundJob for DailyReportJob {
    fn id(&self) -> &'static str {
        "daily_report"
    }

    fn description(&self) -> &'static str {
        "Post the most frequent words of today's played titles to each channel"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Daily(self.at)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let mut failures = Vec::new();
        for channel in &self.channels {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            match ctx.dispatcher.submit_report(channel) {
                Ok(Some(job)) => info!("Queued report {} for {}", job.id, channel),
                Ok(None) => debug!("Report for {} already queued", channel),
                Err(e) => {
                    warn!("Failed to queue report for {}: {}", channel, e);
                    failures.push(channel.as_str());
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(JobError::ExecutionFailed(format!(
                "could not queue reports for {}",
                failures.join(", ")
            )))
        }
    }
}

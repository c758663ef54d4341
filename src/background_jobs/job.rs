use super::context::JobContext;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Weekday};
use std::time::Duration;
use thiserror::Error;

/// Wall-clock time of day a job runs at, in the server's local time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAt {
    pub hour: u32,
    pub minute: u32,
    /// Skip Saturdays and Sundays.
    pub weekdays_only: bool,
}

impl DailyAt {
    /// First matching time strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = now.timezone();
        let today = now.date_naive();
        (0..8).find_map(|offset| {
            let date = today + ChronoDuration::days(offset);
            if self.weekdays_only && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                return None;
            }
            let candidate = date
                .and_hms_opt(self.hour, self.minute, 0)?
                .and_local_timezone(tz.clone())
                .earliest()?;
            (candidate > *now).then_some(candidate)
        })
    }
}

/// Schedule for when a job should run.
#[derive(Debug, Clone)]
pub enum JobSchedule {
    /// Run every day at a fixed time.
    Daily(DailyAt),
    /// Run at fixed intervals and on each of `hooks`.
    Every {
        interval: Duration,
        hooks: Vec<HookEvent>,
    },
}

impl JobSchedule {
    /// Next scheduled run after `now`.
    pub fn next_run_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            JobSchedule::Daily(at) => at.next_after(now),
            JobSchedule::Every { interval, .. } => ChronoDuration::from_std(*interval)
                .ok()
                .map(|d| now.clone() + d),
        }
    }

    pub fn listens_to(&self, event: HookEvent) -> bool {
        match self {
            JobSchedule::Every { hooks, .. } => hooks.contains(&event),
            JobSchedule::Daily(_) => false,
        }
    }
}

/// Events that can trigger hook-based jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    OnStartup,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::OnStartup => write!(f, "OnStartup"),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Job was cancelled")]
    Cancelled,
}

/// Trait for periodic background jobs.
///
/// Jobs are executed synchronously in a blocking context.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// Execute the job.
    ///
    /// Called through `spawn_blocking`. Long loops should check
    /// `ctx.is_cancelled()` and bail out with `JobError::Cancelled`.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}

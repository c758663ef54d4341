//! Periodic job scheduling.
//!
//! The scheduler fires jobs on a wall-clock or interval schedule, or on
//! startup. Jobs hand heavy work over to the task workers.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, DailyAt, HookEvent, JobError, JobSchedule};
pub use scheduler::JobScheduler;

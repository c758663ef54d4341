//! Periodic jobs run by the scheduler.

pub mod daily_report;
pub mod job_retention;

pub use daily_report::DailyReportJob;
pub use job_retention::JobRetentionJob;

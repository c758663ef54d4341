//! Durable background work: media fetch, loudness normalization and the
//! per-channel daily report.
//!
//! Jobs are recorded in `jobs.db` and picked up by one worker loop per kind.
//! Submission is idempotent per media: a second fetch or normalize request
//! while one is waiting or running is dropped.

mod dispatcher;
mod fetch;
mod job_store;
mod models;
mod normalize;
mod report;
mod schema;

pub use dispatcher::{DispatcherConfig, JobExecutor, TaskDispatcher};
pub use fetch::FetchExecutor;
pub use job_store::{JobStore, SqliteJobStore};
pub use models::{Job, JobKind, JobStatus, NewJob};
pub use normalize::NormalizeExecutor;
pub use report::{top_words, ReportExecutor, DEFAULT_TOP_WORDS};

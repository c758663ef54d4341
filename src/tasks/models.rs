use crate::queue_store::EntryId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Download and transcode the media of a queue entry.
    Fetch,
    /// Produce a loudness-normalized copy of prepared media.
    Normalize,
    /// Post the daily report of a channel.
    Report,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Fetch, JobKind::Normalize, JobKind::Report];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobKind::Fetch => "fetch",
            JobKind::Normalize => "normalize",
            JobKind::Report => "report",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "fetch" => Some(JobKind::Fetch),
            "normalize" => Some(JobKind::Normalize),
            "report" => Some(JobKind::Report),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Active,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobStatus::Waiting),
            "active" => Some(JobStatus::Active),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::Waiting | JobStatus::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub media_id: Option<String>,
    pub queue_entry_id: Option<EntryId>,
    pub channel: Option<String>,
    pub status: JobStatus,
    pub attempts: i64,
    pub error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

/// Payload of a job to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub kind: JobKind,
    pub media_id: Option<String>,
    pub queue_entry_id: Option<EntryId>,
    pub channel: Option<String>,
}

impl NewJob {
    pub fn fetch(media_id: &str, queue_entry_id: EntryId, channel: &str) -> Self {
        NewJob {
            kind: JobKind::Fetch,
            media_id: Some(media_id.to_string()),
            queue_entry_id: Some(queue_entry_id),
            channel: Some(channel.to_string()),
        }
    }

    pub fn normalize(media_id: &str) -> Self {
        NewJob {
            kind: JobKind::Normalize,
            media_id: Some(media_id.to_string()),
            queue_entry_id: None,
            channel: None,
        }
    }

    pub fn report(channel: &str) -> Self {
        NewJob {
            kind: JobKind::Report,
            media_id: None,
            queue_entry_id: None,
            channel: Some(channel.to_string()),
        }
    }
}

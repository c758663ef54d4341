//! Durable job records.
//!
//! Jobs live in their own database so the queue database never waits on
//! worker bookkeeping. A job moves `waiting -> active -> succeeded|failed`;
//! jobs found `active` at startup were interrupted and go back to `waiting`.

use super::models::{Job, JobKind, JobStatus, NewJob};
use super::schema::JOBS_VERSIONED_SCHEMAS;
use crate::error::{JukeboxError, JukeboxResult};
use crate::sqlite_persistence::open_versioned_db;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub trait JobStore: Send + Sync {
    /// Insert a new waiting job.
    fn submit(&self, job: NewJob) -> JukeboxResult<Job>;

    /// Insert a new waiting job unless one of the same kind is already
    /// waiting or active for the same media (or, for media-less jobs, the
    /// same channel). Returns `None` when deduplicated.
    fn submit_unless_in_flight(&self, job: NewJob) -> JukeboxResult<Option<Job>>;

    /// Whether a job of `kind` for `media_id` is waiting or active.
    fn has_in_flight(&self, kind: JobKind, media_id: &str) -> JukeboxResult<bool>;

    /// Atomically take the oldest waiting job of `kind` and mark it active.
    fn claim_next(&self, kind: JobKind) -> JukeboxResult<Option<Job>>;

    fn mark_succeeded(&self, job_id: &str) -> JukeboxResult<()>;

    fn mark_failed(&self, job_id: &str, error: &str) -> JukeboxResult<()>;

    fn get_job(&self, job_id: &str) -> JukeboxResult<Option<Job>>;

    fn list_jobs(&self, kind: JobKind) -> JukeboxResult<Vec<Job>>;

    /// Put every active job back to waiting. Returns how many were reset.
    fn requeue_active(&self) -> JukeboxResult<usize>;

    /// Delete finished jobs of `kind` in one of `statuses` that finished
    /// before `finished_before` (unix seconds).
    fn prune(
        &self,
        kind: JobKind,
        statuses: &[JobStatus],
        finished_before: i64,
    ) -> JukeboxResult<usize>;
}

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, JOBS_VERSIONED_SCHEMAS, "jobs")?;
        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_db(JOBS_VERSIONED_SCHEMAS)?;
        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    Ok(Job {
        id: row.get("id")?,
        kind: JobKind::from_db_str(&kind).unwrap_or(JobKind::Fetch),
        media_id: row.get("media_id")?,
        queue_entry_id: row.get("queue_entry_id")?,
        channel: row.get("channel")?,
        status: JobStatus::from_db_str(&status).unwrap_or(JobStatus::Failed),
        attempts: row.get("attempts")?,
        error: row.get("error")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
    })
}

fn fetch_job(conn: &Connection, job_id: &str) -> rusqlite::Result<Option<Job>> {
    conn.query_row("SELECT * FROM job WHERE id = ?1", params![job_id], row_to_job)
        .optional()
}

fn insert_job(conn: &Connection, job: &NewJob) -> JukeboxResult<Job> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        r#"INSERT INTO job (id, kind, media_id, queue_entry_id, channel, status, attempts, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)"#,
        params![
            id,
            job.kind.as_db_str(),
            job.media_id,
            job.queue_entry_id,
            job.channel,
            JobStatus::Waiting.as_db_str(),
            now(),
        ],
    )?;
    fetch_job(conn, &id)?
        .ok_or_else(|| JukeboxError::Internal(format!("job {} vanished after insert", id)))
}

fn finish_job(
    conn: &Connection,
    job_id: &str,
    status: JobStatus,
    error: Option<&str>,
) -> JukeboxResult<()> {
    let updated = conn.execute(
        "UPDATE job SET status = ?1, error = ?2, finished_at = ?3 WHERE id = ?4",
        params![status.as_db_str(), error, now(), job_id],
    )?;
    if updated == 0 {
        return Err(JukeboxError::NotFound(format!("job {}", job_id)));
    }
    Ok(())
}

impl JobStore for SqliteJobStore {
    fn submit(&self, job: NewJob) -> JukeboxResult<Job> {
        let conn = self.conn.lock().unwrap();
        insert_job(&conn, &job)
    }

    fn submit_unless_in_flight(&self, job: NewJob) -> JukeboxResult<Option<Job>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let in_flight: bool = match &job.media_id {
            Some(media_id) => tx.query_row(
                r#"SELECT EXISTS(SELECT 1 FROM job
                   WHERE kind = ?1 AND media_id = ?2 AND status IN ('waiting', 'active'))"#,
                params![job.kind.as_db_str(), media_id],
                |row| row.get(0),
            )?,
            None => tx.query_row(
                r#"SELECT EXISTS(SELECT 1 FROM job
                   WHERE kind = ?1 AND media_id IS NULL AND channel IS ?2
                   AND status IN ('waiting', 'active'))"#,
                params![job.kind.as_db_str(), job.channel],
                |row| row.get(0),
            )?,
        };
        if in_flight {
            debug!(
                "Skipping {} job for {:?}/{:?}: already in flight",
                job.kind, job.media_id, job.channel
            );
            return Ok(None);
        }

        let inserted = insert_job(&tx, &job)?;
        tx.commit()?;
        Ok(Some(inserted))
    }

    fn has_in_flight(&self, kind: JobKind, media_id: &str) -> JukeboxResult<bool> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            r#"SELECT EXISTS(SELECT 1 FROM job
               WHERE kind = ?1 AND media_id = ?2 AND status IN ('waiting', 'active'))"#,
            params![kind.as_db_str(), media_id],
            |row| row.get(0),
        )?)
    }

    fn claim_next(&self, kind: JobKind) -> JukeboxResult<Option<Job>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let next: Option<String> = tx
            .query_row(
                r#"SELECT id FROM job WHERE kind = ?1 AND status = 'waiting'
                   ORDER BY created_at ASC, rowid ASC LIMIT 1"#,
                params![kind.as_db_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = next else {
            return Ok(None);
        };

        tx.execute(
            r#"UPDATE job SET status = 'active', attempts = attempts + 1,
               started_at = ?1, finished_at = NULL, error = NULL WHERE id = ?2"#,
            params![now(), id],
        )?;
        let job = fetch_job(&tx, &id)?;
        tx.commit()?;
        Ok(job)
    }

    fn mark_succeeded(&self, job_id: &str) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        finish_job(&conn, job_id, JobStatus::Succeeded, None)
    }

    fn mark_failed(&self, job_id: &str, error: &str) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        finish_job(&conn, job_id, JobStatus::Failed, Some(error))
    }

    fn get_job(&self, job_id: &str) -> JukeboxResult<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        Ok(fetch_job(&conn, job_id)?)
    }

    fn list_jobs(&self, kind: JobKind) -> JukeboxResult<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM job WHERE kind = ?1 ORDER BY created_at ASC, rowid ASC")?;
        let jobs = stmt
            .query_map(params![kind.as_db_str()], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn requeue_active(&self) -> JukeboxResult<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "UPDATE job SET status = 'waiting', started_at = NULL WHERE status = 'active'",
            [],
        )?)
    }

    fn prune(
        &self,
        kind: JobKind,
        statuses: &[JobStatus],
        finished_before: i64,
    ) -> JukeboxResult<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let mut removed = 0;
        for status in statuses {
            removed += conn.execute(
                r#"DELETE FROM job WHERE kind = ?1 AND status = ?2
                   AND finished_at IS NOT NULL AND finished_at < ?3"#,
                params![kind.as_db_str(), status.as_db_str(), finished_before],
            )?;
        }
        Ok(removed)
    }
}

//! Database schema for jobs.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 0
// =============================================================================

const JOB_TABLE_V0: Table = Table {
    name: "job",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("media_id", &SqlType::Text),
        sqlite_column!("queue_entry_id", &SqlType::Integer),
        sqlite_column!("channel", &SqlType::Text),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer),
        sqlite_column!("finished_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_job_kind_status", "kind, status"),
        ("idx_job_media", "media_id"),
    ],
    unique_constraints: &[],
};

pub const JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[JOB_TABLE_V0],
    migration: None,
}];

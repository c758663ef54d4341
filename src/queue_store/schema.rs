//! Database schema for jukebox.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

// =============================================================================
// Version 0
// =============================================================================

const MEDIA_ITEM_TABLE_V0: Table = Table {
    name: "media_item",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("video_id", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("link", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "duration_seconds",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("thumbnail_url", &SqlType::Text),
        sqlite_column!(
            "info",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'{}'")
        ),
        sqlite_column!("filename", &SqlType::Text),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        sqlite_column!(
            "has_normalized",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("download_started_at", &SqlType::Integer),
        sqlite_column!("download_ended_at", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_media_item_state", "state")],
    unique_constraints: &[],
};

/// Playlist chain. `next_id` is unique so the chain can never fork.
const QUEUE_ENTRY_TABLE_V0: Table = Table {
    name: "queue_entry",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("channel", &SqlType::Text, non_null = true),
        sqlite_column!(
            "next_id",
            &SqlType::Integer,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "queue_entry",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::SetNull,
            })
        ),
        sqlite_column!("state", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_first_item",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "is_deleted",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "is_ready",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "media_id",
            &SqlType::Text,
            foreign_key = Some(&ForeignKey {
                foreign_table: "media_item",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::SetNull,
            })
        ),
        sqlite_column!("owner_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "added_automatically",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "notification_refs",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'{}'")
        ),
        sqlite_column!("played_at", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_queue_entry_channel_state", "channel, state"),
        ("idx_queue_entry_channel_first", "channel, is_first_item"),
        ("idx_queue_entry_media", "media_id"),
    ],
    unique_constraints: &[],
};

pub const JUKEBOX_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[MEDIA_ITEM_TABLE_V0, QUEUE_ENTRY_TABLE_V0],
    migration: None,
}];

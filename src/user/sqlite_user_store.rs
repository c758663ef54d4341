use crate::error::{JukeboxError, JukeboxResult};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned_db, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    DEFAULT_TIMESTAMP,
};
use crate::user::{ChannelMembership, User, UserStore};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("username", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[],
};
const USER_CHANNEL_TABLE_V_0: Table = Table {
    name: "user_channel",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("channel", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_owner",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    unique_constraints: &[&["user_id", "channel"]],
    indices: &[("idx_user_channel_channel", "channel")],
};

pub const USERS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[USER_TABLE_V_0, USER_CHANNEL_TABLE_V_0],
    migration: None,
}];

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, USERS_VERSIONED_SCHEMAS, "user")?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_db(USERS_VERSIONED_SCHEMAS)?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        name: row.get("name")?,
        created_at: row.get("created")?,
    })
}

fn row_to_membership(row: &rusqlite::Row) -> rusqlite::Result<ChannelMembership> {
    Ok(ChannelMembership {
        channel: row.get("channel")?,
        is_owner: row.get("is_owner")?,
    })
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, username: &str, name: &str) -> JukeboxResult<User> {
        let conn = self.conn.lock().unwrap();
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM user WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        if taken {
            return Err(JukeboxError::Invalid(format!(
                "username {} is already taken",
                username
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO user (id, username, name) VALUES (?1, ?2, ?3)",
            params![id, username, name],
        )?;
        info!("Created user {} ({})", username, id);
        Ok(conn.query_row(
            "SELECT * FROM user WHERE id = ?1",
            params![id],
            row_to_user,
        )?)
    }

    fn get_user(&self, user_id: &str) -> JukeboxResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM user WHERE id = ?1",
                params![user_id],
                row_to_user,
            )
            .optional()?)
    }

    fn get_user_by_username(&self, username: &str) -> JukeboxResult<Option<User>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM user WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?)
    }

    fn get_all_users(&self) -> JukeboxResult<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM user ORDER BY username")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    fn grant_channel(&self, user_id: &str, channel: &str, is_owner: bool) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM user WHERE id = ?1)",
            params![user_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(JukeboxError::NotFound(format!("user {}", user_id)));
        }
        conn.execute(
            r#"INSERT INTO user_channel (user_id, channel, is_owner) VALUES (?1, ?2, ?3)
               ON CONFLICT (user_id, channel) DO UPDATE SET is_owner = excluded.is_owner"#,
            params![user_id, channel, is_owner],
        )?;
        Ok(())
    }

    fn revoke_channel(&self, user_id: &str, channel: &str) -> JukeboxResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM user_channel WHERE user_id = ?1 AND channel = ?2",
            params![user_id, channel],
        )?;
        Ok(removed > 0)
    }

    fn get_channels(&self, user_id: &str) -> JukeboxResult<Vec<ChannelMembership>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT channel, is_owner FROM user_channel WHERE user_id = ?1 ORDER BY channel",
        )?;
        let channels = stmt
            .query_map(params![user_id], row_to_membership)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }

    fn get_membership(
        &self,
        user_id: &str,
        channel: &str,
    ) -> JukeboxResult<Option<ChannelMembership>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT channel, is_owner FROM user_channel WHERE user_id = ?1 AND channel = ?2",
                params![user_id, channel],
                row_to_membership,
            )
            .optional()?)
    }
}

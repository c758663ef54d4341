//! SQLite-backed playlist chain and media storage.
//!
//! Every chain mutation runs inside a `BEGIN IMMEDIATE` transaction on a
//! single mutex-guarded connection, so concurrent appends and moves on the
//! same channel are serialized both inside this process and against other
//! processes sharing the database file.

use super::models::*;
use super::schema::JUKEBOX_VERSIONED_SCHEMAS;
use super::{MediaStore, QueueStore};
use crate::error::{JukeboxError, JukeboxResult};
use crate::sqlite_persistence::open_versioned_db;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueueStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, JUKEBOX_VERSIONED_SCHEMAS, "jukebox")?;
        Ok(SqliteQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_db(JUKEBOX_VERSIONED_SCHEMAS)?;
        Ok(SqliteQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn entry_not_found(id: EntryId) -> JukeboxError {
    JukeboxError::NotFound(format!("playlist entry {}", id))
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
    let refs: String = row.get("notification_refs")?;
    Ok(QueueEntry {
        id: row.get("id")?,
        channel: row.get("channel")?,
        next_id: row.get("next_id")?,
        state: EntryState::from_db_str(&row.get::<_, String>("state")?)
            .unwrap_or(EntryState::NotPlayedYet),
        is_first_item: row.get("is_first_item")?,
        is_deleted: row.get("is_deleted")?,
        is_ready: row.get("is_ready")?,
        media_id: row.get("media_id")?,
        owner_id: row.get("owner_id")?,
        added_automatically: row.get("added_automatically")?,
        notification_refs: serde_json::from_str(&refs).unwrap_or_default(),
        played_at: row.get("played_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_media(row: &rusqlite::Row) -> rusqlite::Result<MediaItem> {
    let info: String = row.get("info")?;
    Ok(MediaItem {
        id: row.get("id")?,
        video_id: row.get("video_id")?,
        link: row.get("link")?,
        title: row.get("title")?,
        duration_seconds: row.get("duration_seconds")?,
        thumbnail_url: row.get("thumbnail_url")?,
        info: serde_json::from_str(&info).unwrap_or_else(|_| serde_json::json!({})),
        filename: row.get("filename")?,
        state: MediaState::from_db_str(&row.get::<_, String>("state")?)
            .unwrap_or(MediaState::JustAdded),
        has_normalized: row.get("has_normalized")?,
        download_started_at: row.get("download_started_at")?,
        download_ended_at: row.get("download_ended_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

// =============================================================================
// Chain primitives. They take a plain connection so they can run both on the
// locked connection and inside a transaction.
// =============================================================================

fn fetch_entry(conn: &Connection, id: EntryId) -> JukeboxResult<Option<QueueEntry>> {
    Ok(conn
        .query_row(
            "SELECT * FROM queue_entry WHERE id = ?1",
            params![id],
            row_to_entry,
        )
        .optional()?)
}

fn require_entry(conn: &Connection, id: EntryId) -> JukeboxResult<QueueEntry> {
    fetch_entry(conn, id)?.ok_or_else(|| entry_not_found(id))
}

fn predecessor(conn: &Connection, channel: &str, id: EntryId) -> JukeboxResult<Option<QueueEntry>> {
    Ok(conn
        .query_row(
            "SELECT * FROM queue_entry WHERE channel = ?1 AND next_id = ?2",
            params![channel, id],
            row_to_entry,
        )
        .optional()?)
}

fn successor(conn: &Connection, entry: &QueueEntry) -> JukeboxResult<Option<QueueEntry>> {
    let Some(next_id) = entry.next_id else {
        return Ok(None);
    };
    match fetch_entry(conn, next_id)? {
        Some(next) if next.channel == entry.channel => Ok(Some(next)),
        Some(_) => Err(JukeboxError::Integrity(format!(
            "entry {} links to entry {} of another channel",
            entry.id, next_id
        ))),
        None => Err(JukeboxError::Integrity(format!(
            "entry {} links to missing entry {}",
            entry.id, next_id
        ))),
    }
}

fn count_entries(conn: &Connection, channel: &str) -> JukeboxResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM queue_entry WHERE channel = ?1",
        params![channel],
        |row| row.get(0),
    )?)
}

fn find_tail(conn: &Connection, channel: &str) -> JukeboxResult<Option<QueueEntry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM queue_entry WHERE channel = ?1 AND next_id IS NULL ORDER BY id DESC LIMIT 2",
    )?;
    let mut tails = stmt
        .query_map(params![channel], row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if tails.len() > 1 {
        return Err(JukeboxError::Integrity(format!(
            "channel {} has more than one tail",
            channel
        )));
    }
    Ok(tails.pop())
}

fn find_head(conn: &Connection, channel: &str) -> JukeboxResult<Option<QueueEntry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM queue_entry WHERE channel = ?1 AND is_first_item = 1 LIMIT 2",
    )?;
    let mut heads = stmt
        .query_map(params![channel], row_to_entry)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if heads.len() > 1 {
        return Err(JukeboxError::Integrity(format!(
            "channel {} has more than one first entry",
            channel
        )));
    }
    Ok(heads.pop())
}

fn set_next(conn: &Connection, id: EntryId, next_id: Option<EntryId>, ts: i64) -> JukeboxResult<()> {
    conn.execute(
        "UPDATE queue_entry SET next_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![next_id, ts, id],
    )?;
    Ok(())
}

fn set_first(conn: &Connection, id: EntryId, is_first: bool, ts: i64) -> JukeboxResult<()> {
    conn.execute(
        "UPDATE queue_entry SET is_first_item = ?1, updated_at = ?2 WHERE id = ?3",
        params![is_first, ts, id],
    )?;
    Ok(())
}

/// Walks the whole chain of `channel` from its head and checks that it is a
/// single acyclic path covering every entry. Returns the entry count.
fn verify_chain(conn: &Connection, channel: &str) -> JukeboxResult<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, next_id, is_first_item FROM queue_entry WHERE channel = ?1",
    )?;
    let rows = stmt
        .query_map(params![channel], |row| {
            Ok((
                row.get::<_, EntryId>(0)?,
                row.get::<_, Option<EntryId>>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if rows.is_empty() {
        return Ok(0);
    }

    let heads: Vec<EntryId> = rows.iter().filter(|r| r.2).map(|r| r.0).collect();
    let &[head] = heads.as_slice() else {
        return Err(JukeboxError::Integrity(format!(
            "channel {} has {} first entries",
            channel,
            heads.len()
        )));
    };
    let links: HashMap<EntryId, Option<EntryId>> = rows.iter().map(|r| (r.0, r.1)).collect();
    if links.values().any(|next| *next == Some(head)) {
        return Err(JukeboxError::Integrity(format!(
            "first entry {} of channel {} has a predecessor",
            head, channel
        )));
    }

    let mut visited = HashSet::new();
    let mut current = Some(head);
    while let Some(id) = current {
        if !visited.insert(id) {
            return Err(JukeboxError::Integrity(format!(
                "cycle through entry {} in channel {}",
                id, channel
            )));
        }
        current = match links.get(&id) {
            Some(next) => *next,
            None => {
                return Err(JukeboxError::Integrity(format!(
                    "channel {} links outside itself at entry {}",
                    channel, id
                )))
            }
        };
    }
    if visited.len() != rows.len() {
        return Err(JukeboxError::Integrity(format!(
            "{} entries of channel {} are unreachable from its head",
            rows.len() - visited.len(),
            channel
        )));
    }
    Ok(rows.len())
}

fn adjacent(
    conn: &Connection,
    start: &QueueEntry,
    direction: Direction,
    limit: usize,
    skip_deleted: bool,
) -> JukeboxResult<Vec<QueueEntry>> {
    let mut out = Vec::new();
    if limit == 0 || (skip_deleted && start.is_deleted) {
        return Ok(out);
    }

    let mut visited = HashSet::from([start.id]);
    let mut current = start.clone();
    while out.len() < limit {
        let step = match direction {
            Direction::Next => successor(conn, &current)?,
            Direction::Previous => predecessor(conn, &current.channel, current.id)?,
        };
        let Some(step) = step else { break };
        if !visited.insert(step.id) {
            return Err(JukeboxError::Integrity(format!(
                "cycle through entry {} in channel {}",
                step.id, step.channel
            )));
        }
        if !(skip_deleted && step.is_deleted) {
            out.push(step.clone());
        }
        current = step;
    }

    if direction == Direction::Previous {
        out.reverse();
    }
    Ok(out)
}

/// Non-deleted entries between the playing entry (or chain start) and
/// `entry_id`, with their total duration. Both exclude the entry itself.
/// Deleted entries have no place in the queue and are rejected.
fn entries_ahead(conn: &Connection, entry_id: EntryId) -> JukeboxResult<(usize, i64)> {
    let entry = require_entry(conn, entry_id)?;
    if entry.is_deleted {
        return Err(JukeboxError::Invalid(format!(
            "playlist entry {} is deleted",
            entry.id
        )));
    }
    if entry.state == EntryState::NowPlaying {
        return Ok((0, 0));
    }

    let mut stmt = conn.prepare(
        r#"SELECT q.*, COALESCE(m.duration_seconds, 0) AS media_duration
           FROM queue_entry q LEFT JOIN media_item m ON m.id = q.media_id
           WHERE q.channel = ?1 AND q.next_id = ?2"#,
    )?;
    let mut visited = HashSet::from([entry.id]);
    let mut current = entry.id;
    let mut count = 0;
    let mut seconds = 0;
    loop {
        let prev = stmt
            .query_row(params![entry.channel, current], |row| {
                Ok((row_to_entry(row)?, row.get::<_, i64>("media_duration")?))
            })
            .optional()?;
        let Some((prev, duration)) = prev else { break };
        if !visited.insert(prev.id) {
            return Err(JukeboxError::Integrity(format!(
                "cycle through entry {} in channel {}",
                prev.id, prev.channel
            )));
        }
        if prev.state == EntryState::NowPlaying {
            break;
        }
        if !prev.is_deleted {
            count += 1;
            seconds += duration;
        }
        current = prev.id;
    }
    Ok((count, seconds))
}

fn first_unplayed(conn: &Connection, head: &QueueEntry) -> JukeboxResult<Option<QueueEntry>> {
    let mut visited = HashSet::new();
    let mut current = Some(head.clone());
    while let Some(entry) = current {
        if !visited.insert(entry.id) {
            return Err(JukeboxError::Integrity(format!(
                "cycle through entry {} in channel {}",
                entry.id, entry.channel
            )));
        }
        if entry.state == EntryState::NotPlayedYet && !entry.is_deleted {
            return Ok(Some(entry));
        }
        current = successor(conn, &entry)?;
    }
    Ok(None)
}

fn move_entry(conn: &Connection, entry_id: EntryId, before_id: Option<EntryId>) -> JukeboxResult<bool> {
    let entry = require_entry(conn, entry_id)?;
    let channel = entry.channel.clone();
    let target = match before_id {
        Some(id) => Some(
            fetch_entry(conn, id)?
                .filter(|t| t.channel == channel)
                .ok_or_else(|| entry_not_found(id))?,
        ),
        None => None,
    };

    match &target {
        Some(t) if t.id == entry.id || entry.next_id == Some(t.id) => return Ok(false),
        None if entry.next_id.is_none() => return Ok(false),
        _ => {}
    }

    let target_prev = match &target {
        Some(t) => predecessor(conn, &channel, t.id)?,
        None => None,
    };
    let entry_prev = predecessor(conn, &channel, entry.id)?;
    let old_tail = match &target {
        Some(_) => None,
        None => find_tail(conn, &channel)?,
    };
    let ts = now();

    // Detach everything that will be relinked so the unique next_id
    // constraint never sees two rows pointing at the same entry.
    set_next(conn, entry.id, None, ts)?;
    if let Some(p) = &target_prev {
        set_next(conn, p.id, None, ts)?;
    }
    if let Some(p) = &entry_prev {
        set_next(conn, p.id, None, ts)?;
    }

    match &target {
        Some(t) => {
            set_next(conn, entry.id, Some(t.id), ts)?;
            if let Some(p) = &target_prev {
                set_next(conn, p.id, Some(entry.id), ts)?;
            }
        }
        None => {
            if let Some(tail) = &old_tail {
                set_next(conn, tail.id, Some(entry.id), ts)?;
            }
        }
    }
    if let Some(p) = &entry_prev {
        set_next(conn, p.id, entry.next_id, ts)?;
    }

    if entry.is_first_item {
        set_first(conn, entry.id, false, ts)?;
        if let Some(next) = entry.next_id {
            set_first(conn, next, true, ts)?;
        }
    } else if let Some(t) = target.as_ref().filter(|t| t.is_first_item) {
        set_first(conn, t.id, false, ts)?;
        set_first(conn, entry.id, true, ts)?;
    }

    verify_chain(conn, &channel)?;
    Ok(true)
}

// =============================================================================
// QueueStore
// =============================================================================

impl QueueStore for SqliteQueueStore {
    fn append(
        &self,
        channel: &str,
        media_id: &str,
        owner_id: &str,
        added_automatically: bool,
    ) -> JukeboxResult<QueueEntry> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let tail = find_tail(&tx, channel)?;
        if tail.is_none() && count_entries(&tx, channel)? > 0 {
            error!("Channel {} has entries but no tail", channel);
            return Err(JukeboxError::Integrity(format!(
                "channel {} has entries but no tail",
                channel
            )));
        }

        let ts = now();
        tx.execute(
            r#"INSERT INTO queue_entry (
                channel, next_id, state, is_first_item, is_deleted, is_ready,
                media_id, owner_id, added_automatically, notification_refs,
                created_at, updated_at
            ) VALUES (?1, NULL, ?2, ?3, 0, 0, ?4, ?5, ?6, '{}', ?7, ?7)"#,
            params![
                channel,
                EntryState::NotPlayedYet.as_db_str(),
                tail.is_none(),
                media_id,
                owner_id,
                added_automatically,
                ts,
            ],
        )?;
        let id = tx.last_insert_rowid();
        if let Some(tail) = &tail {
            set_next(&tx, tail.id, Some(id), ts)?;
        }
        let entry = require_entry(&tx, id)?;
        tx.commit()?;

        debug!(
            "Appended entry {} to channel {} after {:?}",
            id,
            channel,
            tail.map(|t| t.id)
        );
        Ok(entry)
    }

    fn move_before(&self, entry_id: EntryId, before_id: Option<EntryId>) -> JukeboxResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let moved = move_entry(&tx, entry_id, before_id)?;
        if moved {
            tx.commit()?;
            debug!("Moved entry {} before {:?}", entry_id, before_id);
        }
        Ok(moved)
    }

    fn delete(&self, entry_id: EntryId) -> JukeboxResult<QueueEntry> {
        let conn = self.conn.lock().unwrap();
        let entry = require_entry(&conn, entry_id)?;
        if entry.is_deleted {
            return Err(JukeboxError::Invalid(format!(
                "playlist entry {} is already deleted",
                entry_id
            )));
        }
        conn.execute(
            "UPDATE queue_entry SET is_deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![now(), entry_id],
        )?;
        require_entry(&conn, entry_id)
    }

    fn rank(&self, entry_id: EntryId) -> JukeboxResult<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(entries_ahead(&conn, entry_id)?.0)
    }

    fn wait_estimate_seconds(&self, entry_id: EntryId) -> JukeboxResult<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(entries_ahead(&conn, entry_id)?.1)
    }

    fn adjacent(
        &self,
        entry_id: EntryId,
        direction: Direction,
        limit: usize,
        skip_deleted: bool,
    ) -> JukeboxResult<Vec<QueueEntry>> {
        let conn = self.conn.lock().unwrap();
        let start = require_entry(&conn, entry_id)?;
        adjacent(&conn, &start, direction, limit, skip_deleted)
    }

    fn get_playlist(
        &self,
        channel: &str,
        previous_count: usize,
        next_count: usize,
    ) -> JukeboxResult<Playlist> {
        let conn = self.conn.lock().unwrap();
        let Some(head) = find_head(&conn, channel)? else {
            if count_entries(&conn, channel)? > 0 {
                return Err(JukeboxError::Integrity(format!(
                    "channel {} has entries but no first entry",
                    channel
                )));
            }
            return Ok(Playlist::default());
        };

        let started: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue_entry WHERE channel = ?1 AND state != ?2",
            params![channel, EntryState::NotPlayedYet.as_db_str()],
            |row| row.get(0),
        )?;
        if started == 0 {
            let mut next = Vec::new();
            if next_count > 0 {
                next.push(head.clone());
                next.extend(adjacent(&conn, &head, Direction::Next, next_count - 1, false)?);
            }
            return Ok(Playlist {
                previous: Vec::new(),
                now_playing: None,
                next,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT * FROM queue_entry WHERE channel = ?1 AND state = ?2 LIMIT 2",
        )?;
        let mut playing = stmt
            .query_map(
                params![channel, EntryState::NowPlaying.as_db_str()],
                row_to_entry,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if playing.len() > 1 {
            return Err(JukeboxError::Integrity(format!(
                "channel {} has more than one playing entry",
                channel
            )));
        }

        let anchor = match playing.pop() {
            Some(entry) => entry,
            None => match first_unplayed(&conn, &head)? {
                Some(entry) => entry,
                None => find_tail(&conn, channel)?.ok_or_else(|| {
                    JukeboxError::Integrity(format!("channel {} has no tail", channel))
                })?,
            },
        };

        let previous = adjacent(&conn, &anchor, Direction::Previous, previous_count, false)?;
        let mut next = Vec::new();
        let mut remaining = next_count;
        if anchor.state == EntryState::NotPlayedYet && remaining > 0 {
            next.push(anchor.clone());
            remaining -= 1;
        }
        next.extend(adjacent(&conn, &anchor, Direction::Next, remaining, false)?);
        let now_playing = (anchor.state == EntryState::NowPlaying).then_some(anchor);

        Ok(Playlist {
            previous,
            now_playing,
            next,
        })
    }

    fn get_entry(&self, entry_id: EntryId) -> JukeboxResult<Option<QueueEntry>> {
        let conn = self.conn.lock().unwrap();
        fetch_entry(&conn, entry_id)
    }

    fn get_entries(&self, ids: &[EntryId]) -> JukeboxResult<Vec<QueueEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = fetch_entry(&conn, *id)? {
                out.push(entry);
            }
        }
        out.sort_by_key(|e| e.id);
        out.dedup_by_key(|e| e.id);
        Ok(out)
    }

    fn set_now_playing(&self, channel: &str, entry_id: EntryId) -> JukeboxResult<EntryState> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entry = require_entry(&tx, entry_id)?;
        if entry.channel != channel {
            return Err(entry_not_found(entry_id));
        }

        let ts = now();
        tx.execute(
            "UPDATE queue_entry SET state = ?1, updated_at = ?2 WHERE channel = ?3 AND state = ?4 AND id != ?5",
            params![
                EntryState::Played.as_db_str(),
                ts,
                channel,
                EntryState::NowPlaying.as_db_str(),
                entry_id
            ],
        )?;
        tx.execute(
            r#"UPDATE queue_entry
               SET state = ?1, played_at = COALESCE(played_at, ?2), updated_at = ?2
               WHERE id = ?3"#,
            params![EntryState::NowPlaying.as_db_str(), ts, entry_id],
        )?;
        tx.commit()?;
        Ok(entry.state)
    }

    fn mark_ready(&self, entry_id: EntryId) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE queue_entry SET is_ready = 1, updated_at = ?1 WHERE id = ?2",
            params![now(), entry_id],
        )?;
        if updated == 0 {
            return Err(entry_not_found(entry_id));
        }
        Ok(())
    }

    fn mark_ready_for_media(&self, media_id: &str) -> JukeboxResult<Vec<EntryId>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ids = {
            let mut stmt = tx.prepare(
                "SELECT id FROM queue_entry WHERE media_id = ?1 AND is_ready = 0 ORDER BY id",
            )?;
            let ids = stmt
                .query_map(params![media_id], |row| row.get::<_, EntryId>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        tx.execute(
            "UPDATE queue_entry SET is_ready = 1, updated_at = ?1 WHERE media_id = ?2 AND is_ready = 0",
            params![now(), media_id],
        )?;
        tx.commit()?;
        Ok(ids)
    }

    fn set_notification_ref(&self, entry_id: EntryId, key: &str, handle: &str) -> JukeboxResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let entry = require_entry(&tx, entry_id)?;
        let mut refs: BTreeMap<String, String> = entry.notification_refs;
        refs.insert(key.to_string(), handle.to_string());
        tx.execute(
            "UPDATE queue_entry SET notification_refs = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&refs)?, now(), entry_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn played_titles_since(&self, channel: &str, since: i64) -> JukeboxResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT m.title FROM queue_entry q
               JOIN media_item m ON m.id = q.media_id
               WHERE q.channel = ?1 AND q.played_at >= ?2 AND q.is_deleted = 0
               ORDER BY q.played_at, q.id"#,
        )?;
        let titles = stmt
            .query_map(params![channel, since], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(titles)
    }

    fn verify_chain(&self, channel: &str) -> JukeboxResult<usize> {
        let conn = self.conn.lock().unwrap();
        verify_chain(&conn, channel)
    }
}

// =============================================================================
// MediaStore
// =============================================================================

impl MediaStore for SqliteQueueStore {
    fn upsert_media(&self, media: NewMedia) -> JukeboxResult<(MediaItem, bool)> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = tx
            .query_row(
                "SELECT * FROM media_item WHERE video_id = ?1",
                params![media.video_id],
                row_to_media,
            )
            .optional()?;
        if let Some(existing) = existing {
            return Ok((existing, false));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let ts = now();
        tx.execute(
            r#"INSERT INTO media_item (
                id, video_id, link, title, duration_seconds, thumbnail_url,
                info, state, has_normalized, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)"#,
            params![
                id,
                media.video_id,
                media.link,
                media.title,
                media.duration_seconds,
                media.thumbnail_url,
                serde_json::to_string(&media.info)?,
                MediaState::JustAdded.as_db_str(),
                ts,
            ],
        )?;
        let item = tx.query_row(
            "SELECT * FROM media_item WHERE id = ?1",
            params![id],
            row_to_media,
        )?;
        tx.commit()?;
        Ok((item, true))
    }

    fn get_media(&self, id: &str) -> JukeboxResult<Option<MediaItem>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT * FROM media_item WHERE id = ?1",
                params![id],
                row_to_media,
            )
            .optional()?)
    }

    fn get_media_many(&self, ids: &[String]) -> JukeboxResult<Vec<MediaItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM media_item WHERE id = ?1")?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = stmt.query_row(params![id], row_to_media).optional()? {
                out.push(item);
            }
        }
        Ok(out)
    }

    fn mark_downloading(&self, id: &str) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        let ts = now();
        let updated = conn.execute(
            r#"UPDATE media_item
               SET state = ?1, download_started_at = ?2, updated_at = ?2
               WHERE id = ?3"#,
            params![MediaState::Downloading.as_db_str(), ts, id],
        )?;
        if updated == 0 {
            return Err(JukeboxError::NotFound(format!("media item {}", id)));
        }
        Ok(())
    }

    fn mark_prepared(&self, id: &str, filename: &str) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        let ts = now();
        let updated = conn.execute(
            r#"UPDATE media_item
               SET state = ?1, filename = ?2, download_ended_at = ?3, updated_at = ?3
               WHERE id = ?4"#,
            params![MediaState::Prepared.as_db_str(), filename, ts, id],
        )?;
        if updated == 0 {
            return Err(JukeboxError::NotFound(format!("media item {}", id)));
        }
        Ok(())
    }

    fn reset_download(&self, id: &str) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE media_item
               SET state = ?1, download_started_at = NULL, updated_at = ?2
               WHERE id = ?3 AND state = ?4"#,
            params![
                MediaState::JustAdded.as_db_str(),
                now(),
                id,
                MediaState::Downloading.as_db_str()
            ],
        )?;
        Ok(())
    }

    fn set_normalized(&self, id: &str, normalized: bool) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE media_item SET has_normalized = ?1, updated_at = ?2 WHERE id = ?3",
            params![normalized, now(), id],
        )?;
        if updated == 0 {
            return Err(JukeboxError::NotFound(format!("media item {}", id)));
        }
        Ok(())
    }

    fn update_media_info(&self, id: &str, media: &NewMedia) -> JukeboxResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE media_item
               SET link = ?1, title = ?2, duration_seconds = ?3, thumbnail_url = ?4,
                   info = ?5, updated_at = ?6
               WHERE id = ?7"#,
            params![
                media.link,
                media.title,
                media.duration_seconds,
                media.thumbnail_url,
                serde_json::to_string(&media.info)?,
                now(),
                id
            ],
        )?;
        if updated == 0 {
            return Err(JukeboxError::NotFound(format!("media item {}", id)));
        }
        Ok(())
    }
}

//! Persistent playlist chains and the media they reference.

mod models;
mod schema;
mod sqlite_queue_store;

pub use models::*;
pub use sqlite_queue_store::SqliteQueueStore;

use crate::error::JukeboxResult;

/// Storage of per-channel playlist chains.
///
/// Mutations that touch links are atomic: either the whole relink lands and
/// the chain still verifies, or nothing changes.
pub trait QueueStore: Send + Sync {
    // === Chain operations ===

    /// Appends a new entry at the tail of `channel`'s chain. The first entry
    /// of a channel becomes its head.
    fn append(
        &self,
        channel: &str,
        media_id: &str,
        owner_id: &str,
        added_automatically: bool,
    ) -> JukeboxResult<QueueEntry>;

    /// Moves an entry right before `before_id`, or to the tail when `None`.
    /// Returns false when the entry is already in that position.
    fn move_before(&self, entry_id: EntryId, before_id: Option<EntryId>) -> JukeboxResult<bool>;

    /// Soft-deletes an entry. It stays linked in the chain.
    fn delete(&self, entry_id: EntryId) -> JukeboxResult<QueueEntry>;

    /// Number of non-deleted entries between the playing entry (or chain
    /// start) and this one. Fails with `Invalid` for a deleted entry.
    fn rank(&self, entry_id: EntryId) -> JukeboxResult<usize>;

    /// Sum of the durations of the entries counted by [`QueueStore::rank`].
    fn wait_estimate_seconds(&self, entry_id: EntryId) -> JukeboxResult<i64>;

    /// Up to `limit` entries next to `entry_id` in chain order.
    fn adjacent(
        &self,
        entry_id: EntryId,
        direction: Direction,
        limit: usize,
        skip_deleted: bool,
    ) -> JukeboxResult<Vec<QueueEntry>>;

    fn get_playlist(
        &self,
        channel: &str,
        previous_count: usize,
        next_count: usize,
    ) -> JukeboxResult<Playlist>;

    /// Checks that the chain is one acyclic path from its head covering all
    /// entries of the channel.
    fn verify_chain(&self, channel: &str) -> JukeboxResult<usize>;

    // === Entry state ===

    fn get_entry(&self, entry_id: EntryId) -> JukeboxResult<Option<QueueEntry>>;

    /// Entries for the given ids in ascending id order. Unknown ids are
    /// skipped.
    fn get_entries(&self, ids: &[EntryId]) -> JukeboxResult<Vec<QueueEntry>>;

    /// Marks the entry as playing and the previously playing one as played.
    /// Returns the state the entry had before.
    fn set_now_playing(&self, channel: &str, entry_id: EntryId) -> JukeboxResult<EntryState>;

    fn mark_ready(&self, entry_id: EntryId) -> JukeboxResult<()>;

    /// Marks every entry of the media as ready and returns the ids that
    /// were not ready before.
    fn mark_ready_for_media(&self, media_id: &str) -> JukeboxResult<Vec<EntryId>>;

    fn set_notification_ref(&self, entry_id: EntryId, key: &str, handle: &str) -> JukeboxResult<()>;

    /// Titles of the entries of `channel` that started playing at or after
    /// `since` (unix seconds).
    fn played_titles_since(&self, channel: &str, since: i64) -> JukeboxResult<Vec<String>>;
}

/// Storage of media items, shared by every channel.
pub trait MediaStore: Send + Sync {
    /// Inserts the media unless one with the same video id exists. Returns
    /// the stored item and whether it was created.
    fn upsert_media(&self, media: NewMedia) -> JukeboxResult<(MediaItem, bool)>;

    fn get_media(&self, id: &str) -> JukeboxResult<Option<MediaItem>>;

    fn get_media_many(&self, ids: &[String]) -> JukeboxResult<Vec<MediaItem>>;

    fn mark_downloading(&self, id: &str) -> JukeboxResult<()>;

    fn mark_prepared(&self, id: &str, filename: &str) -> JukeboxResult<()>;

    /// Returns a media stuck in DOWNLOADING to JUST_ADDED.
    fn reset_download(&self, id: &str) -> JukeboxResult<()>;

    fn set_normalized(&self, id: &str, normalized: bool) -> JukeboxResult<()>;

    fn update_media_info(&self, id: &str, media: &NewMedia) -> JukeboxResult<()>;
}

//! Data models for channel playlists.
//!
//! A channel's playlist is a singly-linked chain of [`QueueEntry`] rows. Each
//! entry points at the entry that plays right after it through `next_id`, and
//! the head of the chain carries `is_first_item`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type EntryId = i64;

/// Notification handle key for the "queued" notice of an entry.
pub const NOTIFICATION_QUEUED: &str = "queued";
/// Notification handle key for the "now playing" notice of an entry.
pub const NOTIFICATION_NOW_PLAYING: &str = "nowPlaying";

/// Playback state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryState {
    NotPlayedYet,
    NowPlaying,
    Played,
}

impl EntryState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EntryState::NotPlayedYet => "NOT_PLAYED_YET",
            EntryState::NowPlaying => "NOW_PLAYING",
            EntryState::Played => "PLAYED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "NOT_PLAYED_YET" => Some(EntryState::NotPlayedYet),
            "NOW_PLAYING" => Some(EntryState::NowPlaying),
            "PLAYED" => Some(EntryState::Played),
            _ => None,
        }
    }
}

/// One slot of a channel playlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: EntryId,
    pub channel: String,
    pub next_id: Option<EntryId>,
    pub state: EntryState,
    pub is_first_item: bool,
    pub is_deleted: bool,
    pub is_ready: bool,
    pub media_id: Option<String>,
    pub owner_id: String,
    pub added_automatically: bool,
    /// Opaque handles of the external notices posted for this entry.
    pub notification_refs: BTreeMap<String, String>,
    pub played_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl QueueEntry {
    pub fn notification_ref(&self, key: &str) -> Option<&str> {
        self.notification_refs.get(key).map(String::as_str)
    }
}

/// Direction of a chain traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards the head, following reverse `next_id` lookups.
    Previous,
    /// Towards the tail, following `next_id`.
    Next,
}

/// A window over a channel playlist, anchored on the playing entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    #[serde(rename = "previousPlaylistItems")]
    pub previous: Vec<QueueEntry>,
    #[serde(rename = "nowPlaying")]
    pub now_playing: Option<QueueEntry>,
    #[serde(rename = "nextPlaylistItems")]
    pub next: Vec<QueueEntry>,
}

impl Playlist {
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty() && self.now_playing.is_none() && self.next.is_empty()
    }

    /// All entries in chain order.
    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.previous
            .iter()
            .chain(self.now_playing.iter())
            .chain(self.next.iter())
    }
}

/// Preparation state of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaState {
    JustAdded,
    Downloading,
    Prepared,
}

impl MediaState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MediaState::JustAdded => "JUST_ADDED",
            MediaState::Downloading => "DOWNLOADING",
            MediaState::Prepared => "PREPARED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "JUST_ADDED" => Some(MediaState::JustAdded),
            "DOWNLOADING" => Some(MediaState::Downloading),
            "PREPARED" => Some(MediaState::Prepared),
            _ => None,
        }
    }
}

/// A video suggested as related to a media item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelatedVideo {
    pub video_id: String,
    pub link: String,
    pub title: String,
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// A piece of playable content referenced by queue entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub video_id: String,
    pub link: String,
    pub title: String,
    pub duration_seconds: i64,
    pub thumbnail_url: Option<String>,
    /// Provider metadata, including the `related` suggestions.
    pub info: serde_json::Value,
    pub filename: Option<String>,
    pub state: MediaState,
    pub has_normalized: bool,
    pub download_started_at: Option<i64>,
    pub download_ended_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MediaItem {
    pub fn is_prepared(&self) -> bool {
        self.state == MediaState::Prepared && self.filename.is_some()
    }

    pub fn related_videos(&self) -> Vec<RelatedVideo> {
        self.info
            .get("related")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Picks up to `count` related videos, in provider order, that have a
    /// known duration below `max_duration_secs` and are not excluded.
    pub fn related_candidates(
        &self,
        count: usize,
        max_duration_secs: i64,
        excluding: &[String],
    ) -> Vec<NewMedia> {
        self.related_videos()
            .into_iter()
            .filter(|r| !r.video_id.is_empty())
            .filter(|r| matches!(r.duration_seconds, Some(d) if d < max_duration_secs))
            .filter(|r| !excluding.contains(&r.video_id))
            .take(count)
            .map(|r| NewMedia {
                duration_seconds: r.duration_seconds.unwrap_or_default(),
                video_id: r.video_id,
                link: r.link,
                title: r.title,
                thumbnail_url: r.thumbnail_url,
                info: serde_json::json!({}),
            })
            .collect()
    }
}

/// Media fields known before the item is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMedia {
    pub video_id: String,
    pub link: String,
    pub title: String,
    pub duration_seconds: i64,
    pub thumbnail_url: Option<String>,
    pub info: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn media_with_related(related: serde_json::Value) -> MediaItem {
        MediaItem {
            id: "m1".to_string(),
            video_id: "v1".to_string(),
            link: "https://example.com/v1".to_string(),
            title: "root".to_string(),
            duration_seconds: 200,
            thumbnail_url: None,
            info: json!({ "related": related }),
            filename: None,
            state: MediaState::JustAdded,
            has_normalized: false,
            download_started_at: None,
            download_ended_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_entry_state_db_strings() {
        for state in [
            EntryState::NotPlayedYet,
            EntryState::NowPlaying,
            EntryState::Played,
        ] {
            assert_eq!(EntryState::from_db_str(state.as_db_str()), Some(state));
        }
        assert_eq!(EntryState::from_db_str("PAUSED"), None);
    }

    #[test]
    fn test_related_candidates_filters_and_keeps_order() {
        let media = media_with_related(json!([
            {"videoId": "a", "link": "l/a", "title": "A", "durationSeconds": 120},
            {"videoId": "b", "link": "l/b", "title": "B", "durationSeconds": 900},
            {"videoId": "c", "link": "l/c", "title": "C"},
            {"videoId": "d", "link": "l/d", "title": "D", "durationSeconds": 300},
            {"videoId": "e", "link": "l/e", "title": "E", "durationSeconds": 60},
        ]));

        let picked = media.related_candidates(2, 500, &["a".to_string()]);
        let ids: Vec<_> = picked.iter().map(|m| m.video_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "e"]);
        assert_eq!(picked[0].duration_seconds, 300);
    }

    #[test]
    fn test_related_candidates_without_info() {
        let mut media = media_with_related(json!(null));
        media.info = json!({});
        assert!(media.related_candidates(3, 500, &[]).is_empty());
    }

    #[test]
    fn test_playlist_serializes_wire_names() {
        let playlist = Playlist::default();
        let value = serde_json::to_value(&playlist).unwrap();
        assert!(value.get("previousPlaylistItems").is_some());
        assert!(value.get("nowPlaying").unwrap().is_null());
        assert!(value.get("nextPlaylistItems").is_some());
    }
}

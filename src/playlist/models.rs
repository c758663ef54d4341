use crate::queue_store::{MediaItem, QueueEntry};
use serde::Serialize;

/// A queue entry with its media, as sent to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaylistItem {
    #[serde(flatten)]
    pub entry: QueueEntry,
    pub item: Option<MediaItem>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistView {
    pub previous_playlist_items: Vec<PlaylistItem>,
    pub now_playing: Option<PlaylistItem>,
    pub next_playlist_items: Vec<PlaylistItem>,
}

/// Result of queueing a link.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddedItem {
    pub item: MediaItem,
    pub playlist_item: QueueEntry,
}

use crate::queue_store::EntryId;
use serde::{Deserialize, Serialize};

/// Playback position reported by a player.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgress {
    pub played_seconds: f64,
    pub played: f64,
    pub loaded_seconds: f64,
    pub loaded: f64,
}

/// A state change in a channel.
///
/// Events are hints: receivers re-read the queue store for anything that
/// needs to be consistent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ChannelEvent {
    Created {
        id: EntryId,
    },
    Downloaded {
        id: EntryId,
    },
    PlaylistUpdated {
        /// Session that caused the update, if it came from a connection.
        #[serde(rename = "updatedBy", default)]
        updated_by: Option<String>,
    },
    PlayerProgressUpdated {
        progress: PlayerProgress,
    },
    VolumeSetRequested {
        volume: f64,
    },
    GetCurrentVolume {
        token: String,
    },
    SkipCurrentPlaylistItemRequested,
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Created { .. } => "created",
            ChannelEvent::Downloaded { .. } => "downloaded",
            ChannelEvent::PlaylistUpdated { .. } => "playlistUpdated",
            ChannelEvent::PlayerProgressUpdated { .. } => "playerProgressUpdated",
            ChannelEvent::VolumeSetRequested { .. } => "volumeSetRequested",
            ChannelEvent::GetCurrentVolume { .. } => "getCurrentVolume",
            ChannelEvent::SkipCurrentPlaylistItemRequested => "skipCurrentPlaylistItemRequested",
        }
    }

    pub fn playlist_updated_by(session_id: impl Into<String>) -> Self {
        ChannelEvent::PlaylistUpdated {
            updated_by: Some(session_id.into()),
        }
    }
}

/// Transport envelope: `{"channel": ..., "event": ..., ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireEvent {
    pub channel: String,
    #[serde(flatten)]
    pub event: ChannelEvent,
}

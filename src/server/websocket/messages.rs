//! WebSocket message types.
//!
//! Client requests are `{sessionId, ts, type, token, data}`; every reply is
//! `{ts, ok, content}` where `ts` echoes the request. Pushes carry `ts = -1`
//! and an `event` field inside `content`.

use crate::error::{ErrorPayload, JukeboxError, JukeboxResult};
use crate::events::{ChannelEvent, PlayerProgress};
use crate::queue_store::EntryId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `ts` of unsolicited messages.
pub const PUSH_TS: i64 = -1;

/// Client -> Server message envelope.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(rename = "type", default)]
    pub request_type: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub ts: i64,
    pub ok: bool,
    pub content: Value,
}

impl Reply {
    pub fn ok(ts: i64, content: impl Serialize) -> Self {
        Self {
            ts,
            ok: true,
            content: serde_json::to_value(content).unwrap_or(Value::Null),
        }
    }

    pub fn error(ts: i64, err: &JukeboxError) -> Self {
        Self {
            ts,
            ok: false,
            content: serde_json::to_value(ErrorPayload::from(err)).unwrap_or(Value::Null),
        }
    }

    pub fn push(event: PushEvent) -> Self {
        Self::ok(PUSH_TS, event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Ping,
    Authenticate,
    GetPlaylist,
    GetPlaylistItemsById,
    MovePlaylistItem,
    DeletePlaylistItem,
    SetIsPlaying,
    AddPlaylistItem,
    AddRelatedVideos,
    SearchRelatedVideos,
    BroadcastProgress,
    ReturnVolume,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Ping => "Ping",
            RequestType::Authenticate => "Authenticate",
            RequestType::GetPlaylist => "GetPlaylist",
            RequestType::GetPlaylistItemsById => "GetPlaylistItemsById",
            RequestType::MovePlaylistItem => "MovePlaylistItem",
            RequestType::DeletePlaylistItem => "DeletePlaylistItem",
            RequestType::SetIsPlaying => "SetIsPlaying",
            RequestType::AddPlaylistItem => "AddPlaylistItem",
            RequestType::AddRelatedVideos => "AddRelatedVideos",
            RequestType::SearchRelatedVideos => "SearchRelatedVideos",
            RequestType::BroadcastProgress => "BroadcastProgress",
            RequestType::ReturnVolume => "ReturnVolume",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(Value::String(s.to_string())).ok()
    }

    /// Whether a message of this type from the lease holder extends its
    /// lease. Keepalives and chatty messages never do.
    pub fn renews_lease(&self) -> bool {
        !matches!(
            self,
            RequestType::Ping
                | RequestType::Authenticate
                | RequestType::BroadcastProgress
                | RequestType::SearchRelatedVideos
        )
    }

    /// Sent several times per second; logged at debug level only.
    pub fn is_chatty(&self) -> bool {
        matches!(self, RequestType::Ping | RequestType::BroadcastProgress)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveData {
    pub id: EntryId,
    #[serde(default)]
    pub move_before: Option<EntryId>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteData {
    pub playlist_item_id: EntryId,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SetIsPlayingData {
    pub id: EntryId,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AddItemData {
    pub link: String,
}

fn default_related_count() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddRelatedData {
    pub item_id: String,
    #[serde(default = "default_related_count")]
    pub count: usize,
    #[serde(default)]
    pub excluding_video_id_candidates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRelatedData {
    pub item_id: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProgressData {
    pub progress: PlayerProgress,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReturnVolumeData {
    pub token: String,
    pub volume: f64,
}

/// A request with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    Authenticate { token: String },
    GetPlaylist,
    GetPlaylistItemsById(Vec<EntryId>),
    MovePlaylistItem(MoveData),
    DeletePlaylistItem(DeleteData),
    SetIsPlaying(SetIsPlayingData),
    AddPlaylistItem(AddItemData),
    AddRelatedVideos(AddRelatedData),
    SearchRelatedVideos(SearchRelatedData),
    BroadcastProgress(ProgressData),
    ReturnVolume(ReturnVolumeData),
}

impl Request {
    pub fn parse(kind: RequestType, token: Option<String>, data: Value) -> JukeboxResult<Self> {
        Ok(match kind {
            RequestType::Ping => Request::Ping,
            RequestType::Authenticate => Request::Authenticate {
                token: token
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| JukeboxError::Invalid("missing token".to_string()))?,
            },
            RequestType::GetPlaylist => Request::GetPlaylist,
            RequestType::GetPlaylistItemsById => {
                Request::GetPlaylistItemsById(serde_json::from_value(data)?)
            }
            RequestType::MovePlaylistItem => Request::MovePlaylistItem(serde_json::from_value(data)?),
            RequestType::DeletePlaylistItem => {
                Request::DeletePlaylistItem(serde_json::from_value(data)?)
            }
            RequestType::SetIsPlaying => Request::SetIsPlaying(serde_json::from_value(data)?),
            RequestType::AddPlaylistItem => Request::AddPlaylistItem(serde_json::from_value(data)?),
            RequestType::AddRelatedVideos => Request::AddRelatedVideos(serde_json::from_value(data)?),
            RequestType::SearchRelatedVideos => {
                Request::SearchRelatedVideos(serde_json::from_value(data)?)
            }
            RequestType::BroadcastProgress => {
                Request::BroadcastProgress(serde_json::from_value(data)?)
            }
            RequestType::ReturnVolume => Request::ReturnVolume(serde_json::from_value(data)?),
        })
    }
}

/// Content of a push message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PushEvent {
    PlaylistItemCreated { id: EntryId },
    ItemDownloaded { id: EntryId },
    PlaylistUpdated,
    PlayerProgressUpdated { progress: PlayerProgress },
    VolumeRequested { token: String },
    VolumeSetRequested { volume: f64 },
    SkipRequested,
}

impl From<ChannelEvent> for PushEvent {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Created { id } => PushEvent::PlaylistItemCreated { id },
            ChannelEvent::Downloaded { id } => PushEvent::ItemDownloaded { id },
            ChannelEvent::PlaylistUpdated { .. } => PushEvent::PlaylistUpdated,
            ChannelEvent::PlayerProgressUpdated { progress } => {
                PushEvent::PlayerProgressUpdated { progress }
            }
            ChannelEvent::GetCurrentVolume { token } => PushEvent::VolumeRequested { token },
            ChannelEvent::VolumeSetRequested { volume } => PushEvent::VolumeSetRequested { volume },
            ChannelEvent::SkipCurrentPlaylistItemRequested => PushEvent::SkipRequested,
        }
    }
}

/// First frame sent on every connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ready {
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_envelope_with_missing_fields() {
        let req: ClientRequest = serde_json::from_value(json!({"type": "Ping"})).unwrap();
        assert_eq!(req.request_type.as_deref(), Some("Ping"));
        assert_eq!(req.ts, None);
        assert_eq!(req.data, Value::Null);
    }

    #[test]
    fn parses_typed_payloads() {
        let req = Request::parse(
            RequestType::MovePlaylistItem,
            None,
            json!({"id": 3, "moveBefore": null}),
        )
        .unwrap();
        assert_eq!(
            req,
            Request::MovePlaylistItem(MoveData {
                id: 3,
                move_before: None
            })
        );

        let req = Request::parse(
            RequestType::AddRelatedVideos,
            None,
            json!({"itemId": "m1"}),
        )
        .unwrap();
        match req {
            Request::AddRelatedVideos(data) => {
                assert_eq!(data.count, 1);
                assert!(data.excluding_video_id_candidates.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bad_payload_is_invalid() {
        let err = Request::parse(RequestType::DeletePlaylistItem, None, json!({"id": 1}))
            .unwrap_err();
        assert!(matches!(err, JukeboxError::Invalid(_)));
        let err = Request::parse(RequestType::Authenticate, None, json!({})).unwrap_err();
        assert!(matches!(err, JukeboxError::Invalid(_)));
    }

    #[test]
    fn request_types_round_trip_names() {
        for name in ["Ping", "SetIsPlaying", "ReturnVolume"] {
            assert_eq!(RequestType::parse(name).unwrap().as_str(), name);
        }
        assert!(RequestType::parse("Search").is_none());
    }

    #[test]
    fn lease_renewal_exclusions() {
        assert!(!RequestType::Ping.renews_lease());
        assert!(!RequestType::BroadcastProgress.renews_lease());
        assert!(!RequestType::SearchRelatedVideos.renews_lease());
        assert!(RequestType::SetIsPlaying.renews_lease());
        assert!(RequestType::GetPlaylist.renews_lease());
    }

    #[test]
    fn push_wire_format() {
        let reply = Reply::push(ChannelEvent::Created { id: 7 }.into());
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"ts": -1, "ok": true, "content": {"event": "PlaylistItemCreated", "id": 7}})
        );

        let reply = Reply::push(ChannelEvent::playlist_updated_by("s1").into());
        assert_eq!(
            serde_json::to_value(&reply).unwrap()["content"],
            json!({"event": "PlaylistUpdated"})
        );
    }

    #[test]
    fn error_reply_carries_code() {
        let reply = Reply::error(12, &JukeboxError::Permission("player only".to_string()));
        assert_eq!(reply.ts, 12);
        assert!(!reply.ok);
        assert_eq!(reply.content["code"], "permission_denied");
    }
}

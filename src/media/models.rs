use crate::queue_store::{NewMedia, RelatedVideo};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Metadata returned by the media provider for a content link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub video_id: String,
    pub title: String,
    pub duration_seconds: i64,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub download_candidates: Vec<DownloadCandidate>,
    #[serde(default)]
    pub related: Vec<RelatedVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCandidate {
    pub url: String,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl DownloadCandidate {
    fn is_audio(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("audio/"))
    }
}

impl MediaMetadata {
    /// Highest bitrate candidate, audio-only streams first.
    pub fn best_candidate(&self) -> Option<&DownloadCandidate> {
        self.download_candidates
            .iter()
            .max_by_key(|c| (c.is_audio(), c.bitrate.unwrap_or(0)))
    }

    pub fn to_new_media(&self, link: &str) -> NewMedia {
        NewMedia {
            video_id: self.video_id.clone(),
            link: link.to_string(),
            title: self.title.clone(),
            duration_seconds: self.duration_seconds,
            thumbnail_url: self.thumbnail_url.clone(),
            info: json!({ "related": self.related }),
        }
    }
}

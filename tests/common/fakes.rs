//! In-process stand-ins for the media pipeline.

use super::constants::*;
use async_trait::async_trait;
use jukebox_server::media::{
    DownloadCandidate, LoudnessNormalizer, MediaError, MediaFetcher, MediaMetadata, MediaProvider,
};
use jukebox_server::queue_store::RelatedVideo;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn link_for(video_id: &str) -> String {
    format!("https://videos.test/watch/{}", video_id)
}

/// Resolves `https://videos.test/watch/<id>` links. Every video suggests
/// `<id>-r1` .. `<id>-r3` as related.
#[derive(Default)]
pub struct FakeMediaProvider;

#[async_trait]
impl MediaProvider for FakeMediaProvider {
    async fn fetch_metadata(&self, link: &str) -> Result<MediaMetadata, MediaError> {
        let video_id = link
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MediaError::Provider(format!("unknown link {}", link)))?
            .to_string();

        let duration_seconds = if video_id == LIVE_VIDEO_ID {
            0
        } else {
            FAKE_DURATION_SECS
        };
        let download_candidates = if video_id == UNAVAILABLE_VIDEO_ID {
            vec![]
        } else {
            vec![DownloadCandidate {
                url: format!("https://cdn.test/{}.webm", video_id),
                bitrate: Some(128),
                mime_type: Some("audio/webm".to_string()),
            }]
        };
        let related = (1..=3)
            .map(|n| {
                let id = format!("{}-r{}", video_id, n);
                RelatedVideo {
                    link: link_for(&id),
                    title: format!("Related {} of {}", n, video_id),
                    duration_seconds: Some(FAKE_DURATION_SECS),
                    thumbnail_url: None,
                    video_id: id,
                }
            })
            .collect();

        Ok(MediaMetadata {
            title: format!("Song {}", video_id),
            video_id,
            duration_seconds,
            thumbnail_url: None,
            download_candidates,
            related,
        })
    }
}

/// Writes a few bytes instead of transcoding.
#[derive(Default)]
pub struct FakeFetcher {
    pub fetches: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, source_url: &str, output: &Path) -> Result<(), MediaError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, source_url.as_bytes()).await?;
        Ok(())
    }
}

/// Copies the source file.
#[derive(Default)]
pub struct FakeNormalizer;

#[async_trait]
impl LoudnessNormalizer for FakeNormalizer {
    async fn normalize(&self, source: &Path, output: &Path) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, output).await?;
        Ok(())
    }
}

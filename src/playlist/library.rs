use crate::error::{JukeboxError, JukeboxResult};
use crate::media::normalized_path;
use crate::queue_store::MediaStore;
use crate::tasks::TaskDispatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Audio file chosen for a prepared media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    pub path: PathBuf,
    pub is_normalized: bool,
    pub content_type: &'static str,
}

/// Maps media items to the files in the download directory.
pub struct MediaLibrary {
    media_store: Arc<dyn MediaStore>,
    dispatcher: Arc<TaskDispatcher>,
    download_dir: PathBuf,
}

impl MediaLibrary {
    pub fn new(
        media_store: Arc<dyn MediaStore>,
        dispatcher: Arc<TaskDispatcher>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            media_store,
            dispatcher,
            download_dir,
        }
    }

    /// Picks the file to serve for `media_id`, preferring the normalized
    /// copy. A normalized flag whose file has vanished is cleared, and a
    /// normalize job is requested whenever the media lacks one.
    pub async fn resolve(&self, media_id: &str) -> JukeboxResult<AudioFile> {
        let mut media = self
            .media_store
            .get_media(media_id)?
            .ok_or_else(|| JukeboxError::NotFound(format!("media item {}", media_id)))?;
        let Some(filename) = media.filename.clone() else {
            return Err(JukeboxError::NotFound(format!(
                "media item {} has no audio file",
                media_id
            )));
        };

        let normalized = normalized_path(&self.download_dir, &filename);
        if media.has_normalized && !tokio::fs::try_exists(&normalized).await.unwrap_or(false) {
            warn!(
                "Normalized file {} of media {} is missing",
                normalized.display(),
                media.id
            );
            self.media_store.set_normalized(&media.id, false)?;
            media.has_normalized = false;
        }

        if let Err(e) = self.dispatcher.ensure_normalize(&media) {
            warn!("Could not request normalization of {}: {}", media.id, e);
        }

        let path = if media.has_normalized {
            normalized
        } else {
            self.download_dir.join(&filename)
        };
        debug!("Media {} resolves to {}", media.id, path.display());
        Ok(AudioFile {
            content_type: content_type_for(&path),
            path,
            is_normalized: media.has_normalized,
        })
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_store::{NewMedia, SqliteQueueStore};
    use crate::tasks::{DispatcherConfig, JobKind, JobStore, SqliteJobStore};
    use tempfile::TempDir;

    struct Fixture {
        queue: Arc<SqliteQueueStore>,
        jobs: Arc<SqliteJobStore>,
        library: MediaLibrary,
        dir: TempDir,
    }

    fn fixture(use_normalize: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let dispatcher = Arc::new(TaskDispatcher::new(
            jobs.clone(),
            queue.clone(),
            queue.clone(),
            DispatcherConfig {
                use_normalize,
                ..DispatcherConfig::default()
            },
        ));
        let library = MediaLibrary::new(queue.clone(), dispatcher, dir.path().to_path_buf());
        Fixture {
            queue,
            jobs,
            library,
            dir,
        }
    }

    fn prepared(f: &Fixture, video_id: &str) -> String {
        let (media, _) = f
            .queue
            .upsert_media(NewMedia {
                video_id: video_id.to_string(),
                link: format!("https://videos/{}", video_id),
                title: format!("Song {}", video_id),
                duration_seconds: 120,
                thumbnail_url: None,
                info: serde_json::Value::Null,
            })
            .unwrap();
        let filename = format!("{}.ogg", video_id);
        std::fs::write(f.dir.path().join(&filename), b"raw").unwrap();
        f.queue.mark_prepared(&media.id, &filename).unwrap();
        media.id
    }

    #[tokio::test]
    async fn unknown_or_unfetched_media_is_not_found() {
        let f = fixture(false);
        assert!(matches!(
            f.library.resolve("missing").await,
            Err(JukeboxError::NotFound(_))
        ));

        let (media, _) = f
            .queue
            .upsert_media(NewMedia {
                video_id: "pending".to_string(),
                link: "https://videos/pending".to_string(),
                title: "Pending".to_string(),
                duration_seconds: 60,
                thumbnail_url: None,
                info: serde_json::Value::Null,
            })
            .unwrap();
        assert!(matches!(
            f.library.resolve(&media.id).await,
            Err(JukeboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn prefers_normalized_copy() {
        let f = fixture(true);
        let id = prepared(&f, "loud");
        let normalized = normalized_path(f.dir.path(), "loud.ogg");
        std::fs::create_dir_all(normalized.parent().unwrap()).unwrap();
        std::fs::write(&normalized, b"normalized").unwrap();
        f.queue.set_normalized(&id, true).unwrap();

        let file = f.library.resolve(&id).await.unwrap();
        assert_eq!(file.path, normalized);
        assert!(file.is_normalized);
        assert_eq!(file.content_type, "audio/ogg");
        assert_eq!(f.jobs.list_jobs(JobKind::Normalize).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn missing_normalized_copy_falls_back_and_renormalizes() {
        let f = fixture(true);
        let id = prepared(&f, "gone");
        f.queue.set_normalized(&id, true).unwrap();

        let file = f.library.resolve(&id).await.unwrap();
        assert_eq!(file.path, f.dir.path().join("gone.ogg"));
        assert!(!file.is_normalized);
        assert!(!f.queue.get_media(&id).unwrap().unwrap().has_normalized);
        assert_eq!(f.jobs.list_jobs(JobKind::Normalize).unwrap().len(), 1);
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("a.oga")), "audio/ogg");
        assert_eq!(content_type_for(Path::new("a.webm")), "audio/webm");
        assert_eq!(content_type_for(Path::new("a")), "application/octet-stream");
    }
}

//! Fetch job: resolve a download candidate, transcode it to local storage and
//! flip every waiting entry of the media to ready.

use super::dispatcher::{JobExecutor, TaskDispatcher};
use super::models::{Job, JobKind};
use crate::error::{JukeboxError, JukeboxResult};
use crate::events::{ChannelEvent, EventBus};
use crate::media::{media_filename, MediaError, MediaFetcher, MediaProvider};
use crate::notifications::NotificationService;
use crate::queue_store::{MediaItem, MediaStore, QueueStore};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub struct FetchExecutor {
    provider: Arc<dyn MediaProvider>,
    fetcher: Arc<dyn MediaFetcher>,
    queue_store: Arc<dyn QueueStore>,
    media_store: Arc<dyn MediaStore>,
    event_bus: Arc<EventBus>,
    notifications: Arc<NotificationService>,
    dispatcher: Arc<TaskDispatcher>,
    download_dir: PathBuf,
}

impl FetchExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn MediaProvider>,
        fetcher: Arc<dyn MediaFetcher>,
        queue_store: Arc<dyn QueueStore>,
        media_store: Arc<dyn MediaStore>,
        event_bus: Arc<EventBus>,
        notifications: Arc<NotificationService>,
        dispatcher: Arc<TaskDispatcher>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            provider,
            fetcher,
            queue_store,
            media_store,
            event_bus,
            notifications,
            dispatcher,
            download_dir,
        }
    }

    async fn download(&self, media: &MediaItem) -> JukeboxResult<String> {
        let metadata = self.provider.fetch_metadata(&media.link).await?;
        let candidate = metadata
            .best_candidate()
            .ok_or_else(|| MediaError::NoCandidate(media.link.clone()))?;

        // Related suggestions saved with auto-queued media carry no metadata.
        self.media_store
            .update_media_info(&media.id, &metadata.to_new_media(&media.link))?;
        self.media_store.mark_downloading(&media.id)?;
        let filename = media_filename(&metadata.title);
        let output = self.download_dir.join(&filename);
        info!("Fetching media {} into {}", media.id, output.display());
        self.fetcher.fetch(&candidate.url, &output).await?;
        Ok(filename)
    }

    /// Marks every unready entry of the media ready and tells their channels.
    async fn announce_ready(&self, media_id: &str) -> JukeboxResult<()> {
        let ready = self.queue_store.mark_ready_for_media(media_id)?;
        for entry in self.queue_store.get_entries(&ready)? {
            if let Err(e) = self
                .event_bus
                .publish(&entry.channel, ChannelEvent::Downloaded { id: entry.id })
                .await
            {
                warn!("Failed to publish downloaded event for {}: {}", entry.id, e);
            }
        }
        Ok(())
    }

    async fn report_failure(&self, job: &Job) {
        let Some(entry_id) = job.queue_entry_id else {
            return;
        };
        match self.queue_store.get_entry(entry_id) {
            Ok(Some(entry)) => self.notifications.fetch_failed(&entry).await,
            Ok(None) => {}
            Err(e) => warn!("Failed to load entry {} after fetch failure: {}", entry_id, e),
        }
    }
}

#[async_trait]
impl JobExecutor for FetchExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Fetch
    }

    async fn execute(&self, job: &Job) -> JukeboxResult<()> {
        let media_id = job
            .media_id
            .as_deref()
            .ok_or_else(|| JukeboxError::Invalid(format!("fetch job {} has no media", job.id)))?;
        let media = self
            .media_store
            .get_media(media_id)?
            .ok_or_else(|| JukeboxError::NotFound(format!("media item {}", media_id)))?;

        if !media.is_prepared() {
            match self.download(&media).await {
                Ok(filename) => self.media_store.mark_prepared(&media.id, &filename)?,
                Err(e) => {
                    if let Err(reset) = self.media_store.reset_download(&media.id) {
                        warn!("Failed to reset media {}: {}", media.id, reset);
                    }
                    self.report_failure(job).await;
                    return Err(e);
                }
            }
        }

        self.announce_ready(&media.id).await?;

        if let Some(prepared) = self.media_store.get_media(&media.id)? {
            self.dispatcher.ensure_normalize(&prepared)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LocalEventTransport;
    use crate::media::{DownloadCandidate, MediaMetadata};
    use crate::notifications::test_support::RecordingNotifier;
    use crate::queue_store::{MediaState, NewMedia, QueueEntry, SqliteQueueStore};
    use crate::tasks::{DispatcherConfig, JobStatus, JobStore, NewJob, SqliteJobStore};
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct FakeProvider {
        candidates: Vec<DownloadCandidate>,
    }

    #[async_trait]
    impl MediaProvider for FakeProvider {
        async fn fetch_metadata(&self, _link: &str) -> Result<MediaMetadata, MediaError> {
            Ok(MediaMetadata {
                video_id: "v1".to_string(),
                title: "Song".to_string(),
                duration_seconds: 100,
                thumbnail_url: None,
                download_candidates: self.candidates.clone(),
                related: vec![],
            })
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        fail: bool,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(&self, source_url: &str, output: &Path) -> Result<(), MediaError> {
            self.urls.lock().unwrap().push(source_url.to_string());
            if self.fail {
                return Err(MediaError::Process {
                    program: "ffmpeg".to_string(),
                    message: "exit status 1".to_string(),
                });
            }
            tokio::fs::write(output, b"ogg").await?;
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        queue: Arc<SqliteQueueStore>,
        jobs: Arc<SqliteJobStore>,
        bus: Arc<EventBus>,
        notifier: Arc<RecordingNotifier>,
        fetcher: Arc<FakeFetcher>,
        executor: FetchExecutor,
        cancel: CancellationToken,
    }

    fn fixture(candidates: Vec<DownloadCandidate>, fetcher: FakeFetcher) -> Fixture {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(SqliteQueueStore::in_memory().unwrap());
        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let bus = Arc::new(EventBus::new(Arc::new(LocalEventTransport::default()), 16));
        let cancel = CancellationToken::new();
        bus.start(cancel.clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let notifications = Arc::new(NotificationService::new(
            notifier.clone(),
            queue.clone(),
            HashMap::from([("lobby".to_string(), "#lobby".to_string())]),
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            jobs.clone(),
            queue.clone(),
            queue.clone(),
            DispatcherConfig {
                use_normalize: true,
                ..Default::default()
            },
        ));
        let fetcher = Arc::new(fetcher);
        let executor = FetchExecutor::new(
            Arc::new(FakeProvider { candidates }),
            fetcher.clone(),
            queue.clone(),
            queue.clone(),
            bus.clone(),
            notifications,
            dispatcher,
            dir.path().to_path_buf(),
        );
        Fixture {
            dir,
            queue,
            jobs,
            bus,
            notifier,
            fetcher,
            executor,
            cancel,
        }
    }

    fn candidate(url: &str, bitrate: u32) -> DownloadCandidate {
        DownloadCandidate {
            url: url.to_string(),
            bitrate: Some(bitrate),
            mime_type: Some("audio/webm".to_string()),
        }
    }

    fn queue_song(queue: &SqliteQueueStore) -> (MediaItem, QueueEntry) {
        let (media, _) = queue
            .upsert_media(NewMedia {
                video_id: "v1".to_string(),
                link: "https://videos/v1".to_string(),
                title: "Song".to_string(),
                duration_seconds: 100,
                thumbnail_url: None,
                info: json!({}),
            })
            .unwrap();
        let entry = queue.append("lobby", &media.id, "alice", false).unwrap();
        (media, entry)
    }

    fn claimed(jobs: &SqliteJobStore, media: &MediaItem, entry: &QueueEntry) -> Job {
        jobs.submit(NewJob::fetch(&media.id, entry.id, "lobby")).unwrap();
        jobs.claim_next(JobKind::Fetch).unwrap().unwrap()
    }

    #[tokio::test]
    async fn successful_fetch_prepares_media_and_readies_entries() {
        let f = fixture(
            vec![candidate("low", 64), candidate("high", 160)],
            FakeFetcher::default(),
        );
        let (media, entry) = queue_song(&f.queue);
        let other = f.queue.append("lobby", &media.id, "bob", false).unwrap();
        let mut sub = f.bus.subscribe("lobby");

        let job = claimed(&f.jobs, &media, &entry);
        f.executor.execute(&job).await.unwrap();

        assert_eq!(f.fetcher.urls.lock().unwrap().clone(), vec!["high"]);
        let media = f.queue.get_media(&media.id).unwrap().unwrap();
        assert_eq!(media.state, MediaState::Prepared);
        let filename = media.filename.clone().unwrap();
        assert!(filename.starts_with("Song_") && filename.ends_with(".ogg"));
        assert!(f.dir.path().join(&filename).exists());

        for id in [entry.id, other.id] {
            assert!(f.queue.get_entry(id).unwrap().unwrap().is_ready);
        }
        let mut announced = vec![];
        for _ in 0..2 {
            match tokio::time::timeout(std::time::Duration::from_secs(1), sub.recv())
                .await
                .unwrap()
            {
                Some(ChannelEvent::Downloaded { id }) => announced.push(id),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(announced, vec![entry.id, other.id]);

        let normalize = f.jobs.list_jobs(JobKind::Normalize).unwrap();
        assert_eq!(normalize.len(), 1);
        assert_eq!(normalize[0].status, JobStatus::Waiting);
        f.cancel.cancel();
    }

    #[tokio::test]
    async fn failed_fetch_resets_media_and_flags_notice() {
        let f = fixture(
            vec![candidate("high", 160)],
            FakeFetcher {
                fail: true,
                ..Default::default()
            },
        );
        let (media, entry) = queue_song(&f.queue);
        f.queue
            .set_notification_ref(entry.id, crate::queue_store::NOTIFICATION_QUEUED, "handle-1")
            .unwrap();

        let job = claimed(&f.jobs, &media, &entry);
        assert!(matches!(
            f.executor.execute(&job).await,
            Err(JukeboxError::Pipeline(_))
        ));

        let media = f.queue.get_media(&media.id).unwrap().unwrap();
        assert_eq!(media.state, MediaState::JustAdded);
        assert!(!f.queue.get_entry(entry.id).unwrap().unwrap().is_ready);
        assert!(f
            .notifier
            .calls()
            .contains(&("react".to_string(), "#lobby".to_string(), "handle-1:x".to_string())));
        assert!(f.jobs.list_jobs(JobKind::Normalize).unwrap().is_empty());
        f.cancel.cancel();
    }

    #[tokio::test]
    async fn no_candidate_is_a_pipeline_failure() {
        let f = fixture(vec![], FakeFetcher::default());
        let (media, entry) = queue_song(&f.queue);
        let job = claimed(&f.jobs, &media, &entry);

        assert!(matches!(
            f.executor.execute(&job).await,
            Err(JukeboxError::Pipeline(_))
        ));
        assert!(f.fetcher.urls.lock().unwrap().is_empty());
        f.cancel.cancel();
    }
}

use super::models::{AddedItem, PlaylistItem, PlaylistView};
use crate::error::{JukeboxError, JukeboxResult};
use crate::events::{ChannelEvent, EventBus, PlayerProgress};
use crate::media::MediaProvider;
use crate::notifications::NotificationService;
use crate::queue_store::{
    Direction, EntryId, EntryState, MediaItem, MediaStore, NewMedia, QueueEntry, QueueStore, RelatedVideo,
};
use crate::server::metrics;
use crate::tasks::TaskDispatcher;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    pub previous_count: usize,
    pub next_count: usize,
    /// Related videos at or above this duration are never suggested.
    pub max_related_duration_secs: i64,
    pub related_search_count: usize,
    pub volume_reply_timeout: Duration,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            previous_count: 25,
            next_count: 200,
            max_related_duration_secs: 500,
            related_search_count: 8,
            volume_reply_timeout: Duration::from_secs(10),
        }
    }
}

type VolumeKey = (String, String);

/// Runs every playlist mutation against the queue store and fans the
/// consequences out to the dispatcher, the event bus and the notifier.
pub struct PlaylistService {
    queue_store: Arc<dyn QueueStore>,
    media_store: Arc<dyn MediaStore>,
    provider: Arc<dyn MediaProvider>,
    event_bus: Arc<EventBus>,
    dispatcher: Arc<TaskDispatcher>,
    notifications: Arc<NotificationService>,
    config: PlaylistConfig,
    volume_waiters: Mutex<HashMap<VolumeKey, oneshot::Sender<f64>>>,
}

/// Counts successful mutations and surfaces integrity violations loudly.
fn observe<T>(op: &str, result: JukeboxResult<T>) -> JukeboxResult<T> {
    match &result {
        Ok(_) => metrics::record_queue_mutation(op),
        Err(JukeboxError::Integrity(msg)) => {
            metrics::record_integrity_error();
            error!("Integrity violation during {}: {}", op, msg);
        }
        Err(_) => {}
    }
    result
}

impl PlaylistService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue_store: Arc<dyn QueueStore>,
        media_store: Arc<dyn MediaStore>,
        provider: Arc<dyn MediaProvider>,
        event_bus: Arc<EventBus>,
        dispatcher: Arc<TaskDispatcher>,
        notifications: Arc<NotificationService>,
        config: PlaylistConfig,
    ) -> Self {
        Self {
            queue_store,
            media_store,
            provider,
            event_bus,
            dispatcher,
            notifications,
            config,
            volume_waiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PlaylistConfig {
        &self.config
    }

    async fn publish(&self, channel: &str, event: ChannelEvent) {
        let name = event.name();
        if let Err(e) = self.event_bus.publish(channel, event).await {
            warn!("Failed to publish {} on {}: {}", name, channel, e);
        }
    }

    /// Loads an entry and checks it belongs to `channel`.
    fn channel_entry(&self, channel: &str, entry_id: EntryId) -> JukeboxResult<QueueEntry> {
        match self.queue_store.get_entry(entry_id)? {
            Some(entry) if entry.channel == channel => Ok(entry),
            _ => Err(JukeboxError::NotFound(format!("playlist item {}", entry_id))),
        }
    }

    fn attach_media(&self, entries: Vec<QueueEntry>) -> JukeboxResult<Vec<PlaylistItem>> {
        let mut ids: Vec<String> = entries.iter().filter_map(|e| e.media_id.clone()).collect();
        ids.sort();
        ids.dedup();
        let media: HashMap<String, MediaItem> = self
            .media_store
            .get_media_many(&ids)?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        Ok(entries
            .into_iter()
            .map(|entry| {
                let item = entry.media_id.as_ref().and_then(|id| media.get(id).cloned());
                PlaylistItem { entry, item }
            })
            .collect())
    }

    /// Appends one media to the channel and kicks off everything a new entry
    /// needs: the fetch, the queued notice and the `created` event.
    async fn enqueue(
        &self,
        channel: &str,
        user_id: &str,
        new_media: NewMedia,
        automatic: bool,
    ) -> JukeboxResult<AddedItem> {
        let (media, created) = self.media_store.upsert_media(new_media)?;
        if created {
            debug!("Stored new media {} ({})", media.id, media.video_id);
        }

        let entry = observe(
            "append",
            self.queue_store
                .append(channel, &media.id, user_id, automatic),
        )?;
        self.dispatcher.ensure_fetch(&media, &entry)?;
        let entry = self.channel_entry(channel, entry.id)?;

        match (
            self.queue_store.rank(entry.id),
            self.queue_store.wait_estimate_seconds(entry.id),
        ) {
            (Ok(rank), Ok(wait)) => {
                self.notifications
                    .entry_queued(&entry, &media, rank, wait)
                    .await
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to rank entry {}: {}", entry.id, e),
        }

        self.publish(channel, ChannelEvent::Created { id: entry.id })
            .await;
        info!(
            "Queued {} on {} as entry {} (automatic: {})",
            media.video_id, channel, entry.id, automatic
        );

        Ok(AddedItem {
            item: media,
            playlist_item: entry,
        })
    }

    /// Resolves `link` through the media provider and queues it.
    pub async fn add_item(&self, channel: &str, link: &str, user_id: &str) -> JukeboxResult<AddedItem> {
        let metadata = self.provider.fetch_metadata(link).await?;
        if metadata.duration_seconds <= 0 {
            return Err(JukeboxError::Invalid(format!(
                "{} has no playable duration",
                link
            )));
        }
        self.enqueue(channel, user_id, metadata.to_new_media(link), false)
            .await
    }

    /// Queues up to `count` related videos of a media, skipping the video ids
    /// in `excluding`.
    pub async fn add_related(
        &self,
        channel: &str,
        user_id: &str,
        media_id: &str,
        count: usize,
        excluding: &[String],
    ) -> JukeboxResult<Vec<AddedItem>> {
        let media = self
            .media_store
            .get_media(media_id)?
            .ok_or_else(|| JukeboxError::NotFound(format!("media item {}", media_id)))?;

        let count = count.min(self.config.related_search_count);
        let candidates =
            media.related_candidates(count, self.config.max_related_duration_secs, excluding);

        let mut added = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            added.push(self.enqueue(channel, user_id, candidate, true).await?);
        }
        Ok(added)
    }

    pub fn search_related(&self, media_id: &str) -> JukeboxResult<Vec<RelatedVideo>> {
        let media = self
            .media_store
            .get_media(media_id)?
            .ok_or_else(|| JukeboxError::NotFound(format!("media item {}", media_id)))?;
        Ok(media
            .related_videos()
            .into_iter()
            .filter(|r| {
                matches!(r.duration_seconds, Some(d) if d < self.config.max_related_duration_secs)
            })
            .take(self.config.related_search_count)
            .collect())
    }

    /// Moves an entry before `before_id` (tail when `None`).
    ///
    /// Clients are told to re-read the playlist whatever the outcome, so a
    /// rejected move still resynchronizes the other connections.
    pub async fn move_item(
        &self,
        channel: &str,
        session_id: &str,
        entry_id: EntryId,
        before_id: Option<EntryId>,
    ) -> JukeboxResult<bool> {
        let result = self
            .channel_entry(channel, entry_id)
            .and_then(|_| observe("move", self.queue_store.move_before(entry_id, before_id)));
        self.publish(channel, ChannelEvent::playlist_updated_by(session_id))
            .await;
        result
    }

    pub async fn delete_item(
        &self,
        channel: &str,
        session_id: &str,
        entry_id: EntryId,
    ) -> JukeboxResult<QueueEntry> {
        self.channel_entry(channel, entry_id)?;
        let entry = observe("delete", self.queue_store.delete(entry_id))?;
        self.publish(channel, ChannelEvent::playlist_updated_by(session_id))
            .await;
        Ok(entry)
    }

    /// Marks an entry as playing. The now playing notice goes out only when
    /// the entry was not already playing.
    pub async fn set_now_playing(
        &self,
        channel: &str,
        session_id: &str,
        entry_id: EntryId,
    ) -> JukeboxResult<()> {
        self.channel_entry(channel, entry_id)?;
        let previous = observe(
            "set_now_playing",
            self.queue_store.set_now_playing(channel, entry_id),
        )?;

        if previous != EntryState::NowPlaying {
            let entry = self.channel_entry(channel, entry_id)?;
            let media = match entry.media_id.as_deref() {
                Some(id) => self.media_store.get_media(id)?,
                None => None,
            };
            if let Some(media) = media {
                self.notifications.now_playing(&entry, &media).await;
            }
        }

        self.publish(channel, ChannelEvent::playlist_updated_by(session_id))
            .await;
        Ok(())
    }

    pub fn get_playlist(&self, channel: &str) -> JukeboxResult<PlaylistView> {
        let playlist = self.queue_store.get_playlist(
            channel,
            self.config.previous_count,
            self.config.next_count,
        )?;
        Ok(PlaylistView {
            previous_playlist_items: self.attach_media(playlist.previous)?,
            now_playing: self
                .attach_media(playlist.now_playing.into_iter().collect())?
                .pop(),
            next_playlist_items: self.attach_media(playlist.next)?,
        })
    }

    /// Entries of `channel` among `ids`, in ascending id order. Ids of other
    /// channels are skipped.
    pub fn get_items_by_id(&self, channel: &str, ids: &[EntryId]) -> JukeboxResult<Vec<PlaylistItem>> {
        let entries = self
            .queue_store
            .get_entries(ids)?
            .into_iter()
            .filter(|e| e.channel == channel)
            .collect();
        self.attach_media(entries)
    }

    pub async fn broadcast_progress(&self, channel: &str, progress: PlayerProgress) {
        self.publish(channel, ChannelEvent::PlayerProgressUpdated { progress })
            .await;
    }

    /// Asks the channel's player for its volume. Returns `None` when no
    /// player answers in time.
    pub async fn request_volume(&self, channel: &str) -> Option<f64> {
        let token = uuid::Uuid::new_v4().to_string();
        let key = (channel.to_string(), token.clone());
        let (tx, rx) = oneshot::channel();
        self.volume_waiters.lock().unwrap().insert(key.clone(), tx);

        self.publish(channel, ChannelEvent::GetCurrentVolume { token })
            .await;

        let volume = match tokio::time::timeout(self.config.volume_reply_timeout, rx).await {
            Ok(Ok(volume)) => Some(volume),
            _ => {
                debug!("No volume reply on {}", channel);
                None
            }
        };
        self.volume_waiters.lock().unwrap().remove(&key);
        volume
    }

    /// Hands a player's volume reply to the waiting request. Returns false
    /// for unknown or expired tokens.
    pub fn return_volume(&self, channel: &str, token: &str, volume: f64) -> bool {
        let waiter = self
            .volume_waiters
            .lock()
            .unwrap()
            .remove(&(channel.to_string(), token.to_string()));
        match waiter {
            Some(tx) => tx.send(volume).is_ok(),
            None => false,
        }
    }

    pub async fn set_volume(&self, channel: &str, volume: f64) -> JukeboxResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(JukeboxError::Invalid(format!(
                "volume {} outside 0..1",
                volume
            )));
        }
        self.publish(channel, ChannelEvent::VolumeSetRequested { volume })
            .await;
        Ok(())
    }

    /// Asks the player to move on. Fails unless something is playing and a
    /// non-deleted entry follows it.
    pub async fn skip_current(&self, channel: &str) -> JukeboxResult<()> {
        let playlist = self.queue_store.get_playlist(channel, 0, 0)?;
        let Some(playing) = playlist.now_playing else {
            return Err(JukeboxError::Invalid(format!(
                "nothing is playing on {}",
                channel
            )));
        };
        let next = self
            .queue_store
            .adjacent(playing.id, Direction::Next, 1, true)?;
        if next.is_empty() {
            return Err(JukeboxError::Invalid(format!(
                "no entry after {} on {}",
                playing.id, channel
            )));
        }

        info!("Skip requested on {} after entry {}", channel, playing.id);
        self.publish(channel, ChannelEvent::SkipCurrentPlaylistItemRequested)
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LocalEventTransport, Subscription};
    use crate::media::{MediaError, MediaMetadata};
    use crate::notifications::test_support::RecordingNotifier;
    use crate::queue_store::SqliteQueueStore;
    use crate::tasks::{DispatcherConfig, JobKind, JobStore, SqliteJobStore};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    struct FakeProvider;

    #[async_trait]
    impl MediaProvider for FakeProvider {
        async fn fetch_metadata(&self, link: &str) -> Result<MediaMetadata, MediaError> {
            let video_id = link.rsplit('/').next().unwrap_or_default().to_string();
            let duration_seconds = if video_id == "live" { 0 } else { 180 };
            let related = serde_json::from_value(json!([
                {"videoId": "r1", "link": "https://videos/r1", "title": "One", "durationSeconds": 200},
                {"videoId": "r2", "link": "https://videos/r2", "title": "Two", "durationSeconds": 3600},
                {"videoId": "r3", "link": "https://videos/r3", "title": "Three", "durationSeconds": 240},
                {"videoId": "r4", "link": "https://videos/r4", "title": "Four"},
            ]))
            .unwrap();
            Ok(MediaMetadata {
                title: format!("Title {}", video_id),
                video_id,
                duration_seconds,
                thumbnail_url: None,
                download_candidates: vec![],
                related,
            })
        }
    }

    struct Fixture {
        queue: Arc<SqliteQueueStore>,
        jobs: Arc<SqliteJobStore>,
        bus: Arc<EventBus>,
        notifier: Arc<RecordingNotifier>,
        service: Arc<PlaylistService>,
        cancel: CancellationToken,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    fn fixture(config: PlaylistConfig) -> Fixture {
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
            DispatcherConfig::default(),
        ));
        let service = Arc::new(PlaylistService::new(
            queue.clone(),
            queue.clone(),
            Arc::new(FakeProvider),
            bus.clone(),
            dispatcher,
            notifications,
            config,
        ));
        Fixture {
            queue,
            jobs,
            bus,
            notifier,
            service,
            cancel,
        }
    }

    async fn next_event(sub: &mut Subscription) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn add_item_queues_fetch_notice_and_event() {
        let f = fixture(PlaylistConfig::default());
        let mut sub = f.bus.subscribe("lobby");

        let added = f
            .service
            .add_item("lobby", "https://videos/abc", "alice")
            .await
            .unwrap();

        assert_eq!(added.item.video_id, "abc");
        assert_eq!(added.playlist_item.owner_id, "alice");
        assert!(!added.playlist_item.added_automatically);
        assert!(!added.playlist_item.is_ready);
        assert_eq!(
            next_event(&mut sub).await,
            ChannelEvent::Created {
                id: added.playlist_item.id
            }
        );

        let fetches = f.jobs.list_jobs(JobKind::Fetch).unwrap();
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].queue_entry_id, Some(added.playlist_item.id));

        let calls = f.notifier.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "post");
        let entry = f.queue.get_entry(added.playlist_item.id).unwrap().unwrap();
        assert_eq!(entry.notification_ref("queued"), Some("handle-1"));
    }

    #[tokio::test]
    async fn add_item_rejects_media_without_duration() {
        let f = fixture(PlaylistConfig::default());
        let result = f.service.add_item("lobby", "https://videos/live", "alice").await;
        assert!(matches!(result, Err(JukeboxError::Invalid(_))));
        assert!(f.service.get_playlist("lobby").unwrap().next_playlist_items.is_empty());
    }

    #[tokio::test]
    async fn add_item_with_prepared_media_is_ready_at_once() {
        let f = fixture(PlaylistConfig::default());
        let first = f
            .service
            .add_item("lobby", "https://videos/abc", "alice")
            .await
            .unwrap();
        f.queue
            .mark_prepared(&first.item.id, "Title_abc.ogg")
            .unwrap();

        let second = f
            .service
            .add_item("lobby", "https://videos/abc", "bob")
            .await
            .unwrap();

        assert_eq!(second.item.id, first.item.id);
        assert!(second.playlist_item.is_ready);
        assert_eq!(f.jobs.list_jobs(JobKind::Fetch).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_related_filters_candidates() {
        let f = fixture(PlaylistConfig::default());
        let root = f
            .service
            .add_item("lobby", "https://videos/abc", "alice")
            .await
            .unwrap();

        let added = f
            .service
            .add_related("lobby", "alice", &root.item.id, 5, &["r1".to_string()])
            .await
            .unwrap();

        let ids: Vec<_> = added.iter().map(|a| a.item.video_id.as_str()).collect();
        assert_eq!(ids, vec!["r3"]);
        assert!(added[0].playlist_item.added_automatically);
        assert_eq!(f.queue.verify_chain("lobby").unwrap(), 2);
    }

    #[tokio::test]
    async fn search_related_respects_limits() {
        let f = fixture(PlaylistConfig {
            related_search_count: 1,
            ..Default::default()
        });
        let root = f
            .service
            .add_item("lobby", "https://videos/abc", "alice")
            .await
            .unwrap();

        let related = f.service.search_related(&root.item.id).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].video_id, "r1");
        assert!(matches!(
            f.service.search_related("missing"),
            Err(JukeboxError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn move_publishes_update_even_when_rejected() {
        let f = fixture(PlaylistConfig::default());
        let a = f.service.add_item("lobby", "https://videos/a", "alice").await.unwrap();
        let b = f.service.add_item("lobby", "https://videos/b", "alice").await.unwrap();
        let other = f.service.add_item("kitchen", "https://videos/c", "alice").await.unwrap();
        let mut sub = f.bus.subscribe("lobby");

        let moved = f
            .service
            .move_item("lobby", "s1", b.playlist_item.id, Some(a.playlist_item.id))
            .await
            .unwrap();
        assert!(moved);
        assert_eq!(next_event(&mut sub).await, ChannelEvent::playlist_updated_by("s1"));

        let result = f
            .service
            .move_item("lobby", "s1", other.playlist_item.id, None)
            .await;
        assert!(matches!(result, Err(JukeboxError::NotFound(_))));
        assert_eq!(next_event(&mut sub).await, ChannelEvent::playlist_updated_by("s1"));

        let view = f.service.get_playlist("lobby").unwrap();
        let order: Vec<_> = view.next_playlist_items.iter().map(|i| i.entry.id).collect();
        assert_eq!(order, vec![b.playlist_item.id, a.playlist_item.id]);
    }

    #[tokio::test]
    async fn delete_twice_is_invalid() {
        let f = fixture(PlaylistConfig::default());
        let a = f.service.add_item("lobby", "https://videos/a", "alice").await.unwrap();

        let deleted = f.service.delete_item("lobby", "s1", a.playlist_item.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(matches!(
            f.service.delete_item("lobby", "s1", a.playlist_item.id).await,
            Err(JukeboxError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn now_playing_notice_goes_out_once() {
        let f = fixture(PlaylistConfig::default());
        let a = f.service.add_item("lobby", "https://videos/a", "alice").await.unwrap();

        f.service.set_now_playing("lobby", "s1", a.playlist_item.id).await.unwrap();
        f.service.set_now_playing("lobby", "s1", a.playlist_item.id).await.unwrap();

        let posts = f
            .notifier
            .calls()
            .into_iter()
            .filter(|(op, _, _)| op == "post")
            .count();
        // Queued notice plus a single now playing notice.
        assert_eq!(posts, 2);

        let view = f.service.get_playlist("lobby").unwrap();
        let playing = view.now_playing.unwrap();
        assert_eq!(playing.entry.id, a.playlist_item.id);
        assert_eq!(playing.item.unwrap().video_id, "a");
    }

    #[tokio::test]
    async fn items_by_id_stay_within_channel() {
        let f = fixture(PlaylistConfig::default());
        let a = f.service.add_item("lobby", "https://videos/a", "alice").await.unwrap();
        let c = f.service.add_item("kitchen", "https://videos/c", "alice").await.unwrap();

        let items = f
            .service
            .get_items_by_id("lobby", &[c.playlist_item.id, a.playlist_item.id, 999])
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].entry.id, a.playlist_item.id);
        assert_eq!(items[0].item.as_ref().unwrap().video_id, "a");
    }

    #[tokio::test]
    async fn volume_request_round_trip() {
        let f = fixture(PlaylistConfig::default());
        let mut sub = f.bus.subscribe("lobby");

        let service = f.service.clone();
        let request = tokio::spawn(async move { service.request_volume("lobby").await });

        let token = match next_event(&mut sub).await {
            ChannelEvent::GetCurrentVolume { token } => token,
            other => panic!("unexpected event {:?}", other),
        };
        assert!(!f.service.return_volume("lobby", "other-token", 0.1));
        assert!(f.service.return_volume("lobby", &token, 0.4));

        assert_eq!(request.await.unwrap(), Some(0.4));
        assert!(!f.service.return_volume("lobby", &token, 0.4));
    }

    #[tokio::test]
    async fn volume_request_times_out() {
        let f = fixture(PlaylistConfig {
            volume_reply_timeout: Duration::from_millis(50),
            ..Default::default()
        });
        assert_eq!(f.service.request_volume("lobby").await, None);
        assert!(f.service.volume_waiters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_volume_validates_range() {
        let f = fixture(PlaylistConfig::default());
        let mut sub = f.bus.subscribe("lobby");

        assert!(matches!(
            f.service.set_volume("lobby", 1.5).await,
            Err(JukeboxError::Invalid(_))
        ));
        f.service.set_volume("lobby", 0.25).await.unwrap();
        assert_eq!(
            next_event(&mut sub).await,
            ChannelEvent::VolumeSetRequested { volume: 0.25 }
        );

    }

    #[tokio::test]
    async fn skip_needs_a_playing_entry_and_a_successor() {
        let f = fixture(PlaylistConfig::default());
        let mut sub = f.bus.subscribe("lobby");

        assert!(matches!(
            f.service.skip_current("lobby").await,
            Err(JukeboxError::Invalid(_))
        ));

        let a = f.service.add_item("lobby", "https://videos/a", "alice").await.unwrap();
        let b = f.service.add_item("lobby", "https://videos/b", "alice").await.unwrap();
        f.service.set_now_playing("lobby", "s1", a.playlist_item.id).await.unwrap();
        f.service.delete_item("lobby", "s1", b.playlist_item.id).await.unwrap();
        assert!(matches!(
            f.service.skip_current("lobby").await,
            Err(JukeboxError::Invalid(_))
        ));

        f.service.add_item("lobby", "https://videos/c", "alice").await.unwrap();
        f.service.skip_current("lobby").await.unwrap();
        loop {
            if next_event(&mut sub).await == ChannelEvent::SkipCurrentPlaylistItemRequested {
                break;
            }
        }
    }
}

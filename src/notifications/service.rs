//! Notice bookkeeping for playlist entries.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::{now_playing_text, queued_text, REACTION_FAILED};
use super::Notifier;
use crate::queue_store::{
    MediaItem, QueueEntry, QueueStore, NOTIFICATION_NOW_PLAYING, NOTIFICATION_QUEUED,
};

pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    queue_store: Arc<dyn QueueStore>,
    /// channel -> notification target
    targets: HashMap<String, String>,
}

impl NotificationService {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        queue_store: Arc<dyn QueueStore>,
        targets: HashMap<String, String>,
    ) -> Self {
        Self {
            notifier,
            queue_store,
            targets,
        }
    }

    fn target(&self, channel: &str) -> Option<&str> {
        let target = self.targets.get(channel).map(String::as_str);
        if target.is_none() {
            debug!("No notification target for channel {}", channel);
        }
        target
    }

    async fn post_and_remember(&self, entry: &QueueEntry, key: &str, text: String) {
        let Some(target) = self.target(&entry.channel) else {
            return;
        };
        match self.notifier.post(target, &text).await {
            Ok(Some(handle)) => {
                if let Err(e) = self
                    .queue_store
                    .set_notification_ref(entry.id, key, &handle)
                {
                    warn!("Failed to store {} notice of entry {}: {}", key, entry.id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to post {} notice of entry {}: {}", key, entry.id, e),
        }
    }

    /// Posts the "queued" notice of a freshly appended entry.
    pub async fn entry_queued(&self, entry: &QueueEntry, media: &MediaItem, rank: usize, wait_seconds: i64) {
        self.post_and_remember(
            entry,
            NOTIFICATION_QUEUED,
            queued_text(entry, media, rank, wait_seconds),
        )
        .await;
    }

    /// Posts the "now playing" notice, or refreshes it when the entry is
    /// played again.
    pub async fn now_playing(&self, entry: &QueueEntry, media: &MediaItem) {
        let text = now_playing_text(entry, media);
        if let Some(handle) = entry.notification_ref(NOTIFICATION_NOW_PLAYING) {
            let Some(target) = self.target(&entry.channel) else {
                return;
            };
            if let Err(e) = self.notifier.update(target, handle, &text).await {
                warn!("Failed to update now playing notice of entry {}: {}", entry.id, e);
            }
            return;
        }
        self.post_and_remember(entry, NOTIFICATION_NOW_PLAYING, text)
            .await;
    }

    /// Flags the queued notice of an entry whose media could not be fetched.
    pub async fn fetch_failed(&self, entry: &QueueEntry) {
        let (Some(target), Some(handle)) = (
            self.target(&entry.channel),
            entry.notification_ref(NOTIFICATION_QUEUED),
        ) else {
            return;
        };
        if let Err(e) = self.notifier.react(target, handle, REACTION_FAILED).await {
            warn!("Failed to react on notice of entry {}: {}", entry.id, e);
        }
    }

    /// Posts a free-form text to the channel's target. Returns whether the
    /// post went through.
    pub async fn post_text(&self, channel: &str, text: &str) -> bool {
        let Some(target) = self.target(channel) else {
            return false;
        };
        match self.notifier.post(target, text).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to post to {}: {}", target, e);
                false
            }
        }
    }
}

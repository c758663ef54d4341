//! Daily report: the most frequent words among titles played today.

use super::dispatcher::JobExecutor;
use super::models::{Job, JobKind};
use crate::error::{JukeboxError, JukeboxResult};
use crate::notifications::NotificationService;
use crate::queue_store::QueueStore;
use async_trait::async_trait;
use chrono::{Local, TimeZone};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_TOP_WORDS: usize = 10;

const MIN_WORD_CHARS: usize = 2;

const IGNORED_WORDS: &[&str] = &[
    "a", "an", "and", "audio", "feat", "ft", "hd", "in", "is", "lyrics", "mv", "of",
    "official", "on", "the", "to", "video",
];

/// Counts words across `titles`, most frequent first, ties alphabetically.
pub fn top_words(titles: &[String], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for title in titles {
        for word in title.unicode_words() {
            let word = word.to_lowercase();
            if word.chars().count() < MIN_WORD_CHARS || IGNORED_WORDS.contains(&word.as_str()) {
                continue;
            }
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

fn start_of_today() -> i64 {
    let today = Local::now().date_naive();
    today
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|t| t.timestamp())
        .unwrap_or(0)
}

pub struct ReportExecutor {
    queue_store: Arc<dyn QueueStore>,
    notifications: Arc<NotificationService>,
    top_n: usize,
}

impl ReportExecutor {
    pub fn new(
        queue_store: Arc<dyn QueueStore>,
        notifications: Arc<NotificationService>,
        top_n: usize,
    ) -> Self {
        Self {
            queue_store,
            notifications,
            top_n,
        }
    }

    pub fn report_text(&self, channel: &str, since: i64) -> JukeboxResult<Option<String>> {
        let titles = self.queue_store.played_titles_since(channel, since)?;
        let words = top_words(&titles, self.top_n);
        if words.is_empty() {
            return Ok(None);
        }
        let listed: Vec<String> = words
            .iter()
            .map(|(word, count)| format!("{} ({})", word, count))
            .collect();
        Ok(Some(format!(
            "Most frequent words in today's ({}) titles: {}",
            Local::now().format("%Y-%m-%d"),
            listed.join(", ")
        )))
    }
}

#[async_trait]
impl JobExecutor for ReportExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Report
    }

    async fn execute(&self, job: &Job) -> JukeboxResult<()> {
        let channel = job
            .channel
            .as_deref()
            .ok_or_else(|| JukeboxError::Invalid(format!("report job {} has no channel", job.id)))?;

        let Some(text) = self.report_text(channel, start_of_today())? else {
            info!("Nothing was played today in {}, no report", channel);
            return Ok(());
        };
        if !self.notifications.post_text(channel, &text).await {
            info!("Report for {} was not posted", channel);
        }
        Ok(())
    }
}

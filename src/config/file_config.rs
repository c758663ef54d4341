use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub download_path: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub jwt_secret: Option<String>,
    pub media_provider_url: Option<String>,
    pub media_provider_timeout_sec: Option<u64>,

    // Feature configs
    pub lease: Option<LeaseConfig>,
    pub encoder: Option<EncoderConfig>,
    pub tasks: Option<TasksConfig>,
    pub report: Option<ReportConfig>,
    pub notifications: Option<NotificationsConfig>,
    pub channels: Vec<ChannelConfig>,
    pub playlist: Option<PlaylistFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LeaseConfig {
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EncoderConfig {
    pub use_normalize: Option<bool>,
    pub ffmpeg_path: Option<String>,
    pub ffmpeg_normalize_path: Option<String>,
    pub target_loudness: Option<f64>,
    pub audio_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TasksConfig {
    pub fetch_workers: Option<usize>,
    pub normalize_workers: Option<usize>,
    pub retention_hours: Option<u64>,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: Option<bool>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub weekdays_only: Option<bool>,
    pub top_words: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub webhook_url: Option<String>,
    pub timeout_sec: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChannelConfig {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub notification_target: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PlaylistFileConfig {
    pub previous_count: Option<usize>,
    pub next_count: Option<usize>,
    pub max_related_duration_secs: Option<i64>,
    pub related_search_count: Option<usize>,
    pub volume_reply_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config: FileConfig = toml::from_str(
            r##"
            port = 4000
            jwt_secret = "s3cret"

            [lease]
            ttl_secs = 15

            [encoder]
            use_normalize = true
            target_loudness = -14.0

            [tasks]
            fetch_workers = 3

            [report]
            hour = 9

            [notifications]
            webhook_url = "http://hooks/jukebox"

            [[channels]]
            key = "lobby"
            name = "Lobby"
            notification_target = "#lobby"

            [[channels]]
            key = "kitchen"

            [playlist]
            next_count = 50
            "##,
        )
        .unwrap();

        assert_eq!(config.port, Some(4000));
        assert_eq!(config.lease.unwrap().ttl_secs, Some(15));
        assert_eq!(config.encoder.unwrap().target_loudness, Some(-14.0));
        assert_eq!(config.tasks.unwrap().fetch_workers, Some(3));
        assert_eq!(config.report.unwrap().hour, Some(9));
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].notification_target.as_deref(), Some("#lobby"));
        assert_eq!(config.channels[1].name, None);
        assert_eq!(config.playlist.unwrap().next_count, Some(50));
    }

    #[test]
    fn empty_file_is_default() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.channels.is_empty());
        assert!(config.encoder.is_none());
    }
}

mod file_config;

pub use file_config::{
    ChannelConfig, EncoderConfig, FileConfig, LeaseConfig, NotificationsConfig,
    PlaylistFileConfig, ReportConfig, TasksConfig,
};

use crate::background_jobs::DailyAt;
use crate::playlist::PlaylistConfig;
use crate::server::RequestsLoggingLevel;
use crate::tasks::{DispatcherConfig, DEFAULT_TOP_WORDS};
use anyhow::{bail, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub download_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub jwt_secret: Option<String>,
    pub media_provider_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub download_path: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub jwt_secret: String,
    pub media_provider_url: Option<String>,
    pub media_provider_timeout_sec: u64,

    // Feature configs (with defaults)
    pub lease_ttl: Duration,
    pub encoder: EncoderSettings,
    pub tasks: TaskSettings,
    pub report: ReportSettings,
    pub notifications: NotificationSettings,
    pub channels: Vec<ChannelSettings>,
    pub playlist: PlaylistConfig,
}

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub use_normalize: bool,
    pub ffmpeg_path: PathBuf,
    pub ffmpeg_normalize_path: PathBuf,
    pub target_loudness: f64,
    pub audio_quality: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            use_normalize: false,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffmpeg_normalize_path: PathBuf::from("/usr/local/bin/ffmpeg-normalize"),
            target_loudness: -13.0,
            audio_quality: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub fetch_workers: usize,
    pub normalize_workers: usize,
    pub retention: Duration,
    pub poll_interval: Duration,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            fetch_workers: 2,
            normalize_workers: 1,
            retention: Duration::from_secs(7 * 24 * 3600),
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub enabled: bool,
    pub at: DailyAt,
    pub top_words: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            at: DailyAt {
                hour: 18,
                minute: 30,
                weekdays_only: true,
            },
            top_words: DEFAULT_TOP_WORDS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub webhook_url: Option<String>,
    pub timeout_sec: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_sec: 10,
        }
    }
}

/// A channel clients can authenticate into.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettings {
    pub key: String,
    pub name: String,
    pub alias: Option<String>,
    #[serde(skip)]
    pub notification_target: Option<String>,
}

impl From<ChannelConfig> for ChannelSettings {
    fn from(c: ChannelConfig) -> Self {
        Self {
            name: c.name.unwrap_or_else(|| c.key.clone()),
            key: c.key,
            alias: c.alias,
            notification_target: c.notification_target,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        // Validate db_dir exists
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let download_path = file
            .download_path
            .map(PathBuf::from)
            .or_else(|| cli.download_path.clone())
            .unwrap_or_else(|| db_dir.join("downloads"));

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let jwt_secret = file
            .jwt_secret
            .or_else(|| cli.jwt_secret.clone())
            .or_else(|| std::env::var(JWT_SECRET_ENV).ok())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "jwt_secret must be specified via --jwt-secret, the config file or {}",
                    JWT_SECRET_ENV
                )
            })?;

        let media_provider_url = file
            .media_provider_url
            .or_else(|| cli.media_provider_url.clone());
        let media_provider_timeout_sec = file.media_provider_timeout_sec.unwrap_or(60);

        let lease_ttl = Duration::from_secs(file.lease.unwrap_or_default().ttl_secs.unwrap_or(10));
        if lease_ttl.is_zero() {
            bail!("lease.ttl_secs must be greater than zero");
        }

        let encoder_file = file.encoder.unwrap_or_default();
        let encoder_defaults = EncoderSettings::default();
        let encoder = EncoderSettings {
            use_normalize: encoder_file
                .use_normalize
                .unwrap_or(encoder_defaults.use_normalize),
            ffmpeg_path: encoder_file
                .ffmpeg_path
                .map(PathBuf::from)
                .unwrap_or(encoder_defaults.ffmpeg_path),
            ffmpeg_normalize_path: encoder_file
                .ffmpeg_normalize_path
                .map(PathBuf::from)
                .unwrap_or(encoder_defaults.ffmpeg_normalize_path),
            target_loudness: encoder_file
                .target_loudness
                .unwrap_or(encoder_defaults.target_loudness),
            audio_quality: encoder_file
                .audio_quality
                .unwrap_or(encoder_defaults.audio_quality),
        };

        let tasks_file = file.tasks.unwrap_or_default();
        let task_defaults = TaskSettings::default();
        let tasks = TaskSettings {
            fetch_workers: tasks_file
                .fetch_workers
                .unwrap_or(task_defaults.fetch_workers),
            normalize_workers: tasks_file
                .normalize_workers
                .unwrap_or(task_defaults.normalize_workers),
            retention: tasks_file
                .retention_hours
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(task_defaults.retention),
            poll_interval: tasks_file
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(task_defaults.poll_interval),
        };
        if tasks.fetch_workers == 0 {
            bail!("tasks.fetch_workers must be at least 1");
        }

        let report_file = file.report.unwrap_or_default();
        let report_defaults = ReportSettings::default();
        let report = ReportSettings {
            enabled: report_file.enabled.unwrap_or(report_defaults.enabled),
            at: DailyAt {
                hour: report_file.hour.unwrap_or(report_defaults.at.hour),
                minute: report_file.minute.unwrap_or(report_defaults.at.minute),
                weekdays_only: report_file
                    .weekdays_only
                    .unwrap_or(report_defaults.at.weekdays_only),
            },
            top_words: report_file.top_words.unwrap_or(report_defaults.top_words),
        };
        if report.at.hour > 23 || report.at.minute > 59 {
            bail!(
                "Invalid report time {:02}:{:02}",
                report.at.hour,
                report.at.minute
            );
        }

        let notifications_file = file.notifications.unwrap_or_default();
        let notifications = NotificationSettings {
            webhook_url: notifications_file.webhook_url,
            timeout_sec: notifications_file
                .timeout_sec
                .unwrap_or(NotificationSettings::default().timeout_sec),
        };

        let channels: Vec<ChannelSettings> =
            file.channels.into_iter().map(ChannelSettings::from).collect();
        let mut seen = HashSet::new();
        for channel in &channels {
            if channel.key.is_empty() {
                bail!("Channel keys must not be empty");
            }
            if !seen.insert(channel.key.as_str()) {
                bail!("Duplicate channel key: {}", channel.key);
            }
        }

        let playlist_file = file.playlist.unwrap_or_default();
        let playlist_defaults = PlaylistConfig::default();
        let playlist = PlaylistConfig {
            previous_count: playlist_file
                .previous_count
                .unwrap_or(playlist_defaults.previous_count),
            next_count: playlist_file
                .next_count
                .unwrap_or(playlist_defaults.next_count),
            max_related_duration_secs: playlist_file
                .max_related_duration_secs
                .unwrap_or(playlist_defaults.max_related_duration_secs),
            related_search_count: playlist_file
                .related_search_count
                .unwrap_or(playlist_defaults.related_search_count),
            volume_reply_timeout: playlist_file
                .volume_reply_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(playlist_defaults.volume_reply_timeout),
        };

        Ok(Self {
            db_dir,
            download_path,
            port,
            metrics_port,
            logging_level,
            jwt_secret,
            media_provider_url,
            media_provider_timeout_sec,
            lease_ttl,
            encoder,
            tasks,
            report,
            notifications,
            channels,
            playlist,
        })
    }

    pub fn queue_db_path(&self) -> PathBuf {
        self.db_dir.join("jukebox.db")
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }

    pub fn user_db_path(&self) -> PathBuf {
        self.db_dir.join("user.db")
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            use_normalize: self.encoder.use_normalize,
            poll_interval: self.tasks.poll_interval,
            fetch_workers: self.tasks.fetch_workers,
            normalize_workers: self.tasks.normalize_workers,
        }
    }

    /// Channel key to notification target, for channels that have one.
    pub fn notification_targets(&self) -> HashMap<String, String> {
        self.channels
            .iter()
            .filter_map(|c| {
                c.notification_target
                    .clone()
                    .map(|target| (c.key.clone(), target))
            })
            .collect()
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jukebox_server::background_jobs::jobs::{DailyReportJob, JobRetentionJob};
use jukebox_server::background_jobs::{JobContext, JobScheduler};
use jukebox_server::config;
use jukebox_server::events::{EventBus, LocalEventTransport, DEFAULT_SUBSCRIBER_QUEUE};
use jukebox_server::lease::InMemoryLeaseStore;
use jukebox_server::media::{FfmpegFetcher, FfmpegNormalizer, HttpMediaProvider};
use jukebox_server::notifications::{LogNotifier, NotificationService, Notifier, WebhookNotifier};
use jukebox_server::playlist::{MediaLibrary, PlaylistService};
use jukebox_server::queue_store::SqliteQueueStore;
use jukebox_server::server::websocket::CoordinatorContext;
use jukebox_server::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use jukebox_server::tasks::{
    FetchExecutor, JobExecutor, NormalizeExecutor, ReportExecutor, SqliteJobStore, TaskDispatcher,
};
use jukebox_server::user::{SqliteUserStore, TokenSigner};

const JOB_RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (jukebox.db, jobs.db, user.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Where prepared audio files are written. Defaults to `<db_dir>/downloads`.
    #[clap(long, value_parser = parse_path)]
    pub download_path: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Secret used to sign connection tokens. Falls back to $JWT_SECRET.
    #[clap(long)]
    pub jwt_secret: Option<String>,

    /// Base URL of the media metadata service.
    #[clap(long)]
    pub media_provider_url: Option<String>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            download_path: args.download_path.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            jwt_secret: args.jwt_secret.clone(),
            media_provider_url: args.media_provider_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  download_path: {:?}", app_config.download_path);
    info!("  port: {}", app_config.port);
    info!(
        "  channels: {:?}",
        app_config
            .channels
            .iter()
            .map(|c| c.key.as_str())
            .collect::<Vec<_>>()
    );

    let media_provider_url = app_config
        .media_provider_url
        .clone()
        .context("media_provider_url must be set on the command line or in the config file")?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    std::fs::create_dir_all(&app_config.download_path).with_context(|| {
        format!(
            "Failed to create download directory {:?}",
            app_config.download_path
        )
    })?;

    // Stores (each creates its database if missing)
    let queue_store = Arc::new(SqliteQueueStore::new(app_config.queue_db_path())?);
    let job_store = Arc::new(SqliteJobStore::new(app_config.jobs_db_path())?);
    let user_store = Arc::new(SqliteUserStore::new(app_config.user_db_path())?);

    let shutdown_token = CancellationToken::new();

    let event_bus = Arc::new(EventBus::new(
        Arc::new(LocalEventTransport::default()),
        DEFAULT_SUBSCRIBER_QUEUE,
    ));
    event_bus.start(shutdown_token.child_token());

    let notifier: Arc<dyn Notifier> = match &app_config.notifications.webhook_url {
        Some(url) => {
            info!("Posting notifications to {}", url);
            Arc::new(WebhookNotifier::new(url, app_config.notifications.timeout_sec)?)
        }
        None => {
            info!("No notification webhook configured, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };
    let notifications = Arc::new(NotificationService::new(
        notifier,
        queue_store.clone(),
        app_config.notification_targets(),
    ));

    let provider = Arc::new(HttpMediaProvider::new(
        &media_provider_url,
        app_config.media_provider_timeout_sec,
    )?);

    let dispatcher = Arc::new(TaskDispatcher::new(
        job_store.clone(),
        queue_store.clone(),
        queue_store.clone(),
        app_config.dispatcher_config(),
    ));

    let mut executors: Vec<Arc<dyn JobExecutor>> = vec![
        Arc::new(FetchExecutor::new(
            provider.clone(),
            Arc::new(FfmpegFetcher::new(
                app_config.encoder.ffmpeg_path.clone(),
                app_config.encoder.audio_quality,
            )),
            queue_store.clone(),
            queue_store.clone(),
            event_bus.clone(),
            notifications.clone(),
            dispatcher.clone(),
            app_config.download_path.clone(),
        )) as Arc<dyn JobExecutor>,
        Arc::new(ReportExecutor::new(
            queue_store.clone(),
            notifications.clone(),
            app_config.report.top_words,
        )),
    ];
    if app_config.encoder.use_normalize {
        info!(
            "Loudness normalization enabled (target {} LUFS)",
            app_config.encoder.target_loudness
        );
        executors.push(Arc::new(NormalizeExecutor::new(
            Arc::new(FfmpegNormalizer::new(
                app_config.encoder.ffmpeg_normalize_path.clone(),
                app_config.encoder.target_loudness,
            )),
            queue_store.clone(),
            app_config.download_path.clone(),
        )));
    }
    dispatcher.start(executors, shutdown_token.child_token());

    let library = Arc::new(MediaLibrary::new(
        queue_store.clone(),
        dispatcher.clone(),
        app_config.download_path.clone(),
    ));

    let playlist = Arc::new(PlaylistService::new(
        queue_store.clone(),
        queue_store.clone(),
        provider,
        event_bus.clone(),
        dispatcher.clone(),
        notifications,
        app_config.playlist.clone(),
    ));

    let coordinator = Arc::new(CoordinatorContext::new(
        playlist,
        Arc::new(InMemoryLeaseStore::new(app_config.lease_ttl)),
        user_store,
        Arc::new(TokenSigner::new(&app_config.jwt_secret)),
        app_config.channels.clone(),
    ));

    // Set up background job scheduler
    let job_context = JobContext::new(shutdown_token.child_token(), dispatcher, job_store);
    let mut scheduler = JobScheduler::new(shutdown_token.clone(), job_context);
    if app_config.report.enabled {
        let report_channels: Vec<String> = app_config
            .channels
            .iter()
            .filter(|c| c.notification_target.is_some())
            .map(|c| c.key.clone())
            .collect();
        scheduler.register_job(Arc::new(DailyReportJob::new(
            report_channels,
            app_config.report.at,
        )));
    }
    scheduler.register_job(Arc::new(JobRetentionJob::new(
        app_config.tasks.retention,
        JOB_RETENTION_INTERVAL,
    )));
    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count()
    );

    // Periodic process metrics
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            metrics::update_memory_usage();
        }
    });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: Some(app_config.metrics_port),
    };

    info!("Ready to serve at port {}!", app_config.port);
    info!("Metrics available at port {}!", app_config.metrics_port);

    // Run HTTP server and job scheduler concurrently
    tokio::select! {
        result = run_server(server_config, coordinator, event_bus, library, shutdown_token.clone()) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = scheduler.run() => {
            info!("Scheduler stopped");
            Ok(())
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give the workers a moment to shut down gracefully
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}

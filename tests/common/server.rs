//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test servers. Each test
//! gets an isolated server with its own databases and download directory.

use super::constants::*;
use super::fakes::{FakeFetcher, FakeMediaProvider, FakeNormalizer};
use jukebox_server::config::ChannelSettings;
use jukebox_server::events::{EventBus, LocalEventTransport, DEFAULT_SUBSCRIBER_QUEUE};
use jukebox_server::lease::{InMemoryLeaseStore, LeaseStore};
use jukebox_server::media::normalized_path;
use jukebox_server::notifications::{LogNotifier, NotificationService};
use jukebox_server::playlist::{MediaLibrary, PlaylistConfig, PlaylistService};
use jukebox_server::queue_store::{MediaItem, MediaStore, QueueStore, SqliteQueueStore};
use jukebox_server::server::websocket::CoordinatorContext;
use jukebox_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use jukebox_server::tasks::{
    DispatcherConfig, FetchExecutor, JobExecutor, NormalizeExecutor, SqliteJobStore,
    TaskDispatcher,
};
use jukebox_server::user::{SqliteUserStore, TokenSigner, UserStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TestServerOptions {
    pub lease_ttl: Duration,
    pub use_normalize: bool,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(10),
            use_normalize: true,
        }
    }
}

/// Test server instance with isolated databases.
///
/// When dropped, the server and its workers shut down and temp resources
/// are cleaned up.
#[allow(dead_code)]
pub struct TestServer {
    /// Base URL for HTTP requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Stores for direct database access in tests
    pub queue_store: Arc<SqliteQueueStore>,
    pub user_store: Arc<SqliteUserStore>,
    pub lease_store: Arc<InMemoryLeaseStore>,
    pub playlist: Arc<PlaylistService>,
    pub fetcher: Arc<FakeFetcher>,
    pub download_dir: PathBuf,

    signer: TokenSigner,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port with three users:
    /// `OWNER_USER` owns `CHANNEL`, `MEMBER_USER` may join it and
    /// `STRANGER_USER` has no grant.
    ///
    /// # Panics
    ///
    /// Panics if any store cannot be created or the server does not become
    /// ready within `SERVER_READY_TIMEOUT_MS`.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let download_dir = temp_dir.path().join("downloads");
        std::fs::create_dir_all(&download_dir).expect("Failed to create download dir");

        let queue_store = Arc::new(
            SqliteQueueStore::new(temp_dir.path().join("jukebox.db"))
                .expect("Failed to open queue store"),
        );
        let job_store = Arc::new(
            SqliteJobStore::new(temp_dir.path().join("jobs.db")).expect("Failed to open job store"),
        );
        let user_store = Arc::new(
            SqliteUserStore::new(temp_dir.path().join("user.db"))
                .expect("Failed to open user store"),
        );
        seed_users(user_store.as_ref());

        let shutdown = CancellationToken::new();

        let event_bus = Arc::new(EventBus::new(
            Arc::new(LocalEventTransport::default()),
            DEFAULT_SUBSCRIBER_QUEUE,
        ));
        event_bus.start(shutdown.child_token());

        let notifications = Arc::new(NotificationService::new(
            Arc::new(LogNotifier),
            queue_store.clone(),
            Default::default(),
        ));
        let provider = Arc::new(FakeMediaProvider);
        let fetcher = Arc::new(FakeFetcher::default());

        let dispatcher = Arc::new(TaskDispatcher::new(
            job_store,
            queue_store.clone(),
            queue_store.clone(),
            DispatcherConfig {
                use_normalize: options.use_normalize,
                poll_interval: Duration::from_millis(100),
                fetch_workers: 1,
                normalize_workers: 1,
            },
        ));
        let executors: Vec<Arc<dyn JobExecutor>> = vec![
            Arc::new(FetchExecutor::new(
                provider.clone(),
                fetcher.clone(),
                queue_store.clone(),
                queue_store.clone(),
                event_bus.clone(),
                notifications.clone(),
                dispatcher.clone(),
                download_dir.clone(),
            )) as Arc<dyn JobExecutor>,
            Arc::new(NormalizeExecutor::new(
                Arc::new(FakeNormalizer),
                queue_store.clone(),
                download_dir.clone(),
            )),
        ];
        dispatcher.start(executors, shutdown.child_token());

        let library = Arc::new(MediaLibrary::new(
            queue_store.clone(),
            dispatcher.clone(),
            download_dir.clone(),
        ));
        let playlist = Arc::new(PlaylistService::new(
            queue_store.clone(),
            queue_store.clone(),
            provider,
            event_bus.clone(),
            dispatcher,
            notifications,
            PlaylistConfig {
                volume_reply_timeout: Duration::from_secs(2),
                ..PlaylistConfig::default()
            },
        ));

        let lease_store = Arc::new(InMemoryLeaseStore::new(options.lease_ttl));
        let coordinator = Arc::new(CoordinatorContext::new(
            playlist.clone(),
            lease_store.clone(),
            user_store.clone(),
            Arc::new(TokenSigner::new(JWT_SECRET)),
            vec![channel(CHANNEL, "Lobby"), channel(OTHER_CHANNEL, "Kitchen")],
        ));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            metrics_port: None,
        };
        let app = make_app(config, coordinator, event_bus, library);

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_shutdown.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            queue_store,
            user_store,
            lease_store,
            playlist,
            fetcher,
            download_dir,
            signer: TokenSigner::new(JWT_SECRET),
            _temp_dir: temp_dir,
            shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    pub fn media_url(&self, media_id: &str) -> String {
        format!("{}/v1/media/{}", self.base_url, media_id)
    }

    pub fn channel_url(&self, channel: &str, route: &str) -> String {
        format!("{}/v1/channels/{}/{}", self.base_url, channel, route)
    }

    pub fn ws_url(&self) -> String {
        self.base_url.replace("http://", "ws://") + "/v1/ws"
    }

    /// Signs a connection token for a seeded user.
    pub fn token(&self, username: &str, channel: &str) -> String {
        let user = self
            .user_store
            .get_user_by_username(username)
            .expect("Failed to read user")
            .expect("Unknown test user");
        self.signer
            .issue(&user.id, channel, Duration::from_secs(3600))
            .expect("Failed to sign token")
    }

    pub async fn lease_holder(&self) -> Option<String> {
        self.lease_store
            .holder(CHANNEL)
            .await
            .expect("Failed to read lease")
    }

    pub fn media(&self, media_id: &str) -> MediaItem {
        self.queue_store
            .get_media(media_id)
            .expect("Failed to read media")
            .expect("Unknown media")
    }

    pub fn normalized_file(&self, media: &MediaItem) -> Option<PathBuf> {
        let filename = media.filename.as_deref()?;
        let path = normalized_path(&self.download_dir, filename);
        path.exists().then_some(path)
    }

    /// Polls until the media is marked normalized.
    pub async fn wait_normalized(&self, media_id: &str) -> MediaItem {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(MESSAGE_TIMEOUT_MS);
        loop {
            let media = self.media(media_id);
            if media.has_normalized {
                return media;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "media {} was never normalized",
                media_id
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Checks the persisted chain of `CHANNEL`.
    pub fn verify_chain(&self) -> usize {
        self.queue_store
            .verify_chain(CHANNEL)
            .expect("Playlist chain is corrupted")
    }

    /// Waits for the server to become ready by polling `/v1/health`
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/v1/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn channel(key: &str, name: &str) -> ChannelSettings {
    ChannelSettings {
        key: key.to_string(),
        name: name.to_string(),
        alias: None,
        notification_target: None,
    }
}

fn seed_users(store: &SqliteUserStore) {
    let owner = store
        .create_user(OWNER_USER, "Alice")
        .expect("Failed to create owner");
    store
        .grant_channel(&owner.id, CHANNEL, true)
        .expect("Failed to grant owner");

    let member = store
        .create_user(MEMBER_USER, "Bob")
        .expect("Failed to create member");
    store
        .grant_channel(&member.id, CHANNEL, false)
        .expect("Failed to grant member");

    store
        .create_user(STRANGER_USER, "Carol")
        .expect("Failed to create stranger");
}

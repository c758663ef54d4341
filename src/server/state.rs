use axum::extract::FromRef;

use crate::events::EventBus;
use crate::playlist::{MediaLibrary, PlaylistService};
use std::sync::Arc;
use std::time::Instant;

use super::websocket::CoordinatorContext;
use super::ServerConfig;

pub type GuardedCoordinator = Arc<CoordinatorContext>;
pub type GuardedEventBus = Arc<EventBus>;
pub type GuardedPlaylistService = Arc<PlaylistService>;
pub type GuardedMediaLibrary = Arc<MediaLibrary>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub coordinator: GuardedCoordinator,
    pub event_bus: GuardedEventBus,
    pub library: GuardedMediaLibrary,
    pub hash: String,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedCoordinator {
    fn from_ref(input: &ServerState) -> Self {
        input.coordinator.clone()
    }
}

impl FromRef<ServerState> for GuardedEventBus {
    fn from_ref(input: &ServerState) -> Self {
        input.event_bus.clone()
    }
}

impl FromRef<ServerState> for GuardedPlaylistService {
    fn from_ref(input: &ServerState) -> Self {
        input.coordinator.playlist.clone()
    }
}

impl FromRef<ServerState> for GuardedMediaLibrary {
    fn from_ref(input: &ServerState) -> Self {
        input.library.clone()
    }
}

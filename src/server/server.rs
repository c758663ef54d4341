use anyhow::{Context, Result};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tracing::info;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::{
    channel_routes::make_channel_routes, log_requests, metrics, state::*, stream_media::stream_media,
    websocket, ServerConfig,
};
use crate::error::JukeboxError;
use crate::events::EventBus;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub channels: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn error_status(err: &JukeboxError) -> StatusCode {
    match err {
        JukeboxError::NotFound(_) => StatusCode::NOT_FOUND,
        JukeboxError::Permission(_) => StatusCode::FORBIDDEN,
        JukeboxError::Invalid(_) => StatusCode::BAD_REQUEST,
        JukeboxError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        JukeboxError::Pipeline(_) => StatusCode::BAD_GATEWAY,
        JukeboxError::Integrity(_) | JukeboxError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(super) fn error_response(err: JukeboxError) -> Response {
    (
        error_status(&err),
        Json(crate::error::ErrorPayload::from(&err)),
    )
        .into_response()
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        channels: state.coordinator.channels.len(),
    };
    Json(stats)
}

pub fn make_app(
    config: ServerConfig,
    coordinator: GuardedCoordinator,
    event_bus: Arc<EventBus>,
    library: GuardedMediaLibrary,
) -> Router {
    let state = ServerState {
        config,
        start_time: Instant::now(),
        coordinator,
        event_bus,
        library,
        hash: env!("GIT_HASH").to_string(),
    };

    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ws", get(websocket::ws_handler))
        .route("/v1/media/{id}", get(stream_media))
        .with_state(state.clone())
        .nest("/v1/channels", make_channel_routes(state.clone()))
        .layer(middleware::from_fn_with_state(state, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics::metrics_handler))
}

/// Serves the API until `shutdown` is cancelled, plus the Prometheus
/// listener when a metrics port is configured.
pub async fn run_server(
    config: ServerConfig,
    coordinator: GuardedCoordinator,
    event_bus: Arc<EventBus>,
    library: GuardedMediaLibrary,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, coordinator, event_bus, library);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on port {}", port);

    if let Some(metrics_port) = metrics_port {
        let metrics_listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", metrics_port))
            .await
            .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;
        info!("Serving metrics on port {}", metrics_port);
        let metrics_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, make_metrics_app())
                .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
                .await
            {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

//! Per-channel HTTP routes: playlist snapshot and player controls.

use super::{
    server::error_response,
    session::Session,
    state::{GuardedPlaylistService, ServerState},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
pub struct VolumeBody {
    pub volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SetVolumeBody {
    pub volume: f64,
}

/// Rejects sessions whose token was issued for another channel.
fn check_channel(session: &Session, channel: &str) -> Result<(), Response> {
    if session.channel_key == channel {
        return Ok(());
    }
    debug!(
        "User {} asked for {} with a token for {}",
        session.user_id, channel, session.channel_key
    );
    Err(StatusCode::FORBIDDEN.into_response())
}

async fn get_channel_playlist(
    session: Session,
    State(playlist): State<GuardedPlaylistService>,
    Path(channel): Path<String>,
) -> Response {
    if let Err(response) = check_channel(&session, &channel) {
        return response;
    }
    match playlist.get_playlist(&channel) {
        Ok(view) => Json(view).into_response(),
        Err(err) => error_response(err),
    }
}

/// Asks the channel's player for its volume. `volume` is null when no
/// player answered in time.
async fn get_channel_volume(
    session: Session,
    State(playlist): State<GuardedPlaylistService>,
    Path(channel): Path<String>,
) -> Response {
    if let Err(response) = check_channel(&session, &channel) {
        return response;
    }
    let volume = playlist.request_volume(&channel).await;
    Json(VolumeBody { volume }).into_response()
}

async fn set_channel_volume(
    session: Session,
    State(playlist): State<GuardedPlaylistService>,
    Path(channel): Path<String>,
    Json(body): Json<SetVolumeBody>,
) -> Response {
    if let Err(response) = check_channel(&session, &channel) {
        return response;
    }
    match playlist.set_volume(&channel, body.volume).await {
        Ok(()) => {
            info!(
                "User {} set volume of {} to {}",
                session.user_id, channel, body.volume
            );
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn skip_channel_item(
    session: Session,
    State(playlist): State<GuardedPlaylistService>,
    Path(channel): Path<String>,
) -> Response {
    if let Err(response) = check_channel(&session, &channel) {
        return response;
    }
    match playlist.skip_current(&channel).await {
        Ok(()) => {
            info!("User {} skipped the current item of {}", session.user_id, channel);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => error_response(err),
    }
}

pub fn make_channel_routes(state: ServerState) -> Router {
    Router::new()
        .route("/{channel}/playlist", get(get_channel_playlist))
        .route(
            "/{channel}/volume",
            get(get_channel_volume).post(set_channel_volume),
        )
        .route("/{channel}/skip", post(skip_channel_item))
        .with_state(state)
}

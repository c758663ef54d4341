//! Per-connection protocol state.
//!
//! A [`Connection`] turns client frames into playlist calls and decides which
//! channel events reach its client. The player role is never stored: it is
//! re-derived from channel ownership and the lease on every message.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::messages::{ClientRequest, Reply, Request, RequestType, PUSH_TS};
use crate::config::ChannelSettings;
use crate::error::{JukeboxError, JukeboxResult};
use crate::events::ChannelEvent;
use crate::lease::LeaseStore;
use crate::playlist::PlaylistService;
use crate::server::metrics;
use crate::user::{TokenSigner, User, UserStore};

/// Collaborators shared by every connection.
pub struct CoordinatorContext {
    pub playlist: Arc<PlaylistService>,
    pub lease: Arc<dyn LeaseStore>,
    pub users: Arc<dyn UserStore>,
    pub signer: Arc<TokenSigner>,
    pub channels: HashMap<String, ChannelSettings>,
}

impl CoordinatorContext {
    pub fn new(
        playlist: Arc<PlaylistService>,
        lease: Arc<dyn LeaseStore>,
        users: Arc<dyn UserStore>,
        signer: Arc<TokenSigner>,
        channels: Vec<ChannelSettings>,
    ) -> Self {
        Self {
            playlist,
            lease,
            users,
            signer,
            channels: channels.into_iter().map(|c| (c.key.clone(), c)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct Identity {
    user: User,
    channel: ChannelSettings,
    is_owner: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateReply<'a> {
    user: &'a User,
    channel: &'a ChannelSettings,
    is_channel_owner: bool,
    is_player: bool,
}

fn to_content(value: impl Serialize) -> JukeboxResult<Value> {
    serde_json::to_value(value).map_err(|e| JukeboxError::Internal(e.to_string()))
}

pub struct Connection {
    ctx: Arc<CoordinatorContext>,
    session_id: String,
    identity: Option<Identity>,
}

impl Connection {
    pub fn new(ctx: Arc<CoordinatorContext>) -> Self {
        Self {
            ctx,
            session_id: uuid::Uuid::new_v4().to_string(),
            identity: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Channel the connection is authenticated into.
    pub fn channel(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.channel.key.as_str())
    }

    async fn is_player(&self) -> bool {
        let Some(identity) = self.identity.as_ref().filter(|i| i.is_owner) else {
            return false;
        };
        match self
            .ctx
            .lease
            .is_holder(&identity.channel.key, &self.session_id)
            .await
        {
            Ok(holder) => holder,
            Err(e) => {
                warn!("Lease lookup failed for {}: {}", identity.channel.key, e);
                false
            }
        }
    }

    /// Handles one text frame and returns the reply to send back.
    pub async fn handle_text(&mut self, text: &str) -> Reply {
        let envelope: ClientRequest = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Failed to parse client message: {}", e);
                metrics::record_ws_request("malformed", "error");
                return Reply::error(
                    PUSH_TS,
                    &JukeboxError::Invalid(format!("malformed message: {}", e)),
                );
            }
        };

        let Some(ts) = envelope.ts else {
            metrics::record_ws_request("malformed", "error");
            return Reply::error(PUSH_TS, &JukeboxError::Invalid("missing ts".to_string()));
        };
        let Some(kind) = envelope.request_type.as_deref().and_then(RequestType::parse) else {
            metrics::record_ws_request("unknown", "error");
            return Reply::error(
                ts,
                &JukeboxError::Invalid(format!(
                    "unknown request type {:?}",
                    envelope.request_type
                )),
            );
        };

        if let Some(session_id) = envelope.session_id.filter(|s| !s.is_empty()) {
            if session_id != self.session_id {
                debug!("Connection session {} is now {}", self.session_id, session_id);
                self.session_id = session_id;
            }
        }

        let is_player = self.is_player().await;
        if is_player && kind.renews_lease() {
            if let Some(channel) = self.channel() {
                if let Err(e) = self.ctx.lease.renew(channel).await {
                    warn!("Failed to renew lease of {}: {}", channel, e);
                }
            }
        }

        let is_owner = self.identity.as_ref().is_some_and(|i| i.is_owner);
        if kind.is_chatty() {
            debug!(
                "{} {} (player: {}, owner: {}, channel: {:?})",
                self.session_id,
                kind.as_str(),
                is_player,
                is_owner,
                self.channel()
            );
        } else {
            info!(
                "{} {} (player: {}, owner: {}, channel: {:?})",
                self.session_id,
                kind.as_str(),
                is_player,
                is_owner,
                self.channel()
            );
        }

        let result = match Request::parse(kind, envelope.token, envelope.data) {
            Ok(request) => self.dispatch(request, is_player).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(content) => {
                metrics::record_ws_request(kind.as_str(), "ok");
                Reply::ok(ts, content)
            }
            Err(e) => {
                metrics::record_ws_request(kind.as_str(), e.code());
                if matches!(e, JukeboxError::Integrity(_) | JukeboxError::Internal(_)) {
                    warn!("{} {} failed: {}", self.session_id, kind.as_str(), e);
                } else {
                    debug!("{} {} failed: {}", self.session_id, kind.as_str(), e);
                }
                Reply::error(ts, &e)
            }
        }
    }

    fn require_identity(&self) -> JukeboxResult<&Identity> {
        self.identity
            .as_ref()
            .ok_or_else(|| JukeboxError::Permission("not authenticated".to_string()))
    }

    fn require_owner(&self) -> JukeboxResult<&Identity> {
        let identity = self.require_identity()?;
        if !identity.is_owner {
            return Err(JukeboxError::Permission(
                "only the channel owner can do this".to_string(),
            ));
        }
        Ok(identity)
    }

    fn require_player(&self, is_player: bool) -> JukeboxResult<&Identity> {
        let identity = self.require_identity()?;
        if !is_player {
            return Err(JukeboxError::Permission(
                "only the channel player can do this".to_string(),
            ));
        }
        Ok(identity)
    }

    async fn dispatch(&mut self, request: Request, is_player: bool) -> JukeboxResult<Value> {
        let playlist = self.ctx.playlist.clone();
        match request {
            Request::Ping => Ok(serde_json::json!({})),
            Request::Authenticate { token } => self.authenticate(&token).await,
            Request::GetPlaylist => {
                let channel = &self.require_identity()?.channel.key;
                to_content(playlist.get_playlist(channel)?)
            }
            Request::GetPlaylistItemsById(ids) => {
                let channel = &self.require_identity()?.channel.key;
                to_content(playlist.get_items_by_id(channel, &ids)?)
            }
            Request::MovePlaylistItem(data) => {
                let channel = &self.require_owner()?.channel.key;
                to_content(
                    playlist
                        .move_item(channel, &self.session_id, data.id, data.move_before)
                        .await?,
                )
            }
            Request::DeletePlaylistItem(data) => {
                let channel = &self.require_owner()?.channel.key;
                playlist
                    .delete_item(channel, &self.session_id, data.playlist_item_id)
                    .await?;
                to_content(true)
            }
            Request::SetIsPlaying(data) => {
                let channel = &self.require_player(is_player)?.channel.key;
                playlist
                    .set_now_playing(channel, &self.session_id, data.id)
                    .await?;
                to_content(true)
            }
            Request::AddPlaylistItem(data) => {
                let identity = self.require_identity()?;
                to_content(
                    playlist
                        .add_item(&identity.channel.key, &data.link, &identity.user.id)
                        .await?,
                )
            }
            Request::AddRelatedVideos(data) => {
                let identity = self.require_identity()?;
                to_content(
                    playlist
                        .add_related(
                            &identity.channel.key,
                            &identity.user.id,
                            &data.item_id,
                            data.count,
                            &data.excluding_video_id_candidates,
                        )
                        .await?,
                )
            }
            Request::SearchRelatedVideos(data) => {
                self.require_identity()?;
                to_content(playlist.search_related(&data.item_id)?)
            }
            Request::BroadcastProgress(data) => {
                let channel = &self.require_player(is_player)?.channel.key;
                playlist.broadcast_progress(channel, data.progress).await;
                to_content(true)
            }
            Request::ReturnVolume(data) => {
                let channel = &self.require_player(is_player)?.channel.key;
                to_content(playlist.return_volume(channel, &data.token, data.volume))
            }
        }
    }

    async fn authenticate(&mut self, token: &str) -> JukeboxResult<Value> {
        let claims = self.ctx.signer.verify(token)?;
        let user = self
            .ctx
            .users
            .get_user(&claims.user_id)?
            .ok_or_else(|| JukeboxError::NotFound(format!("user {}", claims.user_id)))?;
        let channel = self
            .ctx
            .channels
            .get(&claims.channel_key)
            .cloned()
            .ok_or_else(|| JukeboxError::NotFound(format!("channel {}", claims.channel_key)))?;
        let membership = self
            .ctx
            .users
            .get_membership(&user.id, &channel.key)?
            .ok_or_else(|| {
                JukeboxError::Permission(format!(
                    "{} has no access to {}",
                    user.username, channel.key
                ))
            })?;

        if membership.is_owner {
            let claimed = self
                .ctx
                .lease
                .try_claim(&channel.key, &self.session_id)
                .await?;
            if claimed {
                info!("Granted player of {} to {}", channel.key, self.session_id);
            }
        }

        self.identity = Some(Identity {
            user,
            channel,
            is_owner: membership.is_owner,
        });
        let is_player = self.is_player().await;
        let identity = self.require_identity()?;
        info!(
            "Authenticated {} (channel: {}, owner: {}, player: {})",
            identity.user.username, identity.channel.key, identity.is_owner, is_player
        );

        to_content(AuthenticateReply {
            user: &identity.user,
            channel: &identity.channel,
            is_channel_owner: identity.is_owner,
            is_player,
        })
    }

    /// Push to send for a channel event, if this connection should see it.
    pub async fn route_event(&self, event: ChannelEvent) -> Option<Reply> {
        let deliver = match &event {
            ChannelEvent::Created { .. } | ChannelEvent::Downloaded { .. } => true,
            ChannelEvent::PlaylistUpdated { updated_by } => {
                updated_by.as_deref() != Some(self.session_id.as_str())
            }
            ChannelEvent::PlayerProgressUpdated { .. } => !self.is_player().await,
            ChannelEvent::GetCurrentVolume { .. }
            | ChannelEvent::VolumeSetRequested { .. }
            | ChannelEvent::SkipCurrentPlaylistItemRequested => self.is_player().await,
        };
        deliver.then(|| Reply::push(event.into()))
    }
}

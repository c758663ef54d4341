use super::state::ServerState;
use crate::user::ChannelMembership;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

/// Caller identity of an HTTP request, from the same signed token used by
/// the websocket `Authenticate` request.
#[derive(Debug)]
pub struct Session {
    pub user_id: String,
    pub channel_key: String,
    pub is_owner: bool,
}

pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

pub enum SessionExtractionError {
    AccessDenied,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
            SessionExtractionError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn extract_session_token_from_headers(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn extract_session_from_request_parts(
    parts: &Parts,
    ctx: &ServerState,
) -> Result<Session, SessionExtractionError> {
    let Some(token) = extract_session_token_from_headers(parts) else {
        debug!("No token in headers.");
        return Err(SessionExtractionError::AccessDenied);
    };

    let claims = ctx.coordinator.signer.verify(&token).map_err(|e| {
        debug!("Rejected session token: {}", e);
        SessionExtractionError::AccessDenied
    })?;

    let membership: ChannelMembership = match ctx
        .coordinator
        .users
        .get_membership(&claims.user_id, &claims.channel_key)
    {
        Ok(Some(membership)) => membership,
        Ok(None) => {
            debug!(
                "User {} has no access to {}",
                claims.user_id, claims.channel_key
            );
            return Err(SessionExtractionError::AccessDenied);
        }
        Err(e) => {
            debug!("Failed to resolve membership of {}: {}", claims.user_id, e);
            return Err(SessionExtractionError::InternalError);
        }
    };

    Ok(Session {
        user_id: claims.user_id,
        channel_key: membership.channel,
        is_owner: membership.is_owner,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx)
    }
}

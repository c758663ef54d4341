//! Signed connection tokens.
//!
//! A token binds a user to one channel: `{"userId", "channelKey", "exp"}`,
//! signed with HS256.

use crate::error::{JukeboxError, JukeboxResult};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthClaims {
    pub user_id: String,
    pub channel_key: String,
    /// Expiry as unix seconds.
    pub exp: u64,
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSigner")
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        TokenSigner {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: &str, channel_key: &str, valid_for: Duration) -> JukeboxResult<String> {
        let claims = AuthClaims {
            user_id: user_id.to_string(),
            channel_key: channel_key.to_string(),
            exp: chrono::Utc::now().timestamp().max(0) as u64 + valid_for.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| JukeboxError::Internal(format!("token signing failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> JukeboxResult<AuthClaims> {
        decode::<AuthClaims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| JukeboxError::Permission(format!("invalid token: {}", e)))
    }
}

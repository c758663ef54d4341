//! Error taxonomy shared by the queue store, lease manager, coordinator and
//! task dispatcher.

use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JukeboxError {
    /// The playlist chain is corrupted (cycle, duplicate successor, broken
    /// head). Never repaired automatically.
    #[error("playlist integrity violation: {0}")]
    Integrity(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    /// Lock contention or a dropped connection. Callers may retry.
    #[error("store temporarily unavailable: {0}")]
    TransientStore(String),

    #[error("media pipeline failure: {0}")]
    Pipeline(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type JukeboxResult<T> = Result<T, JukeboxError>;

impl JukeboxError {
    pub fn code(&self) -> &'static str {
        match self {
            JukeboxError::Integrity(_) => "integrity_error",
            JukeboxError::NotFound(_) => "not_found",
            JukeboxError::Permission(_) => "permission_denied",
            JukeboxError::TransientStore(_) => "transient_store_error",
            JukeboxError::Pipeline(_) => "pipeline_failure",
            JukeboxError::Invalid(_) => "invalid_request",
            JukeboxError::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JukeboxError::TransientStore(_))
    }
}

impl From<rusqlite::Error> for JukeboxError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => JukeboxError::NotFound("row".to_string()),
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                JukeboxError::TransientStore(err.to_string())
            }
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                JukeboxError::Integrity(err.to_string())
            }
            _ => JukeboxError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for JukeboxError {
    fn from(err: serde_json::Error) -> Self {
        JukeboxError::Invalid(err.to_string())
    }
}

/// Error body sent back to a websocket client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&JukeboxError> for ErrorPayload {
    fn from(err: &JukeboxError) -> Self {
        ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

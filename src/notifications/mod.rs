//! Human-readable notices posted to an external messaging service.
//!
//! Notices are keyed by opaque handles returned by the service; the handles
//! are kept in the entry's `notification_refs` so later notices can update or
//! react to earlier ones. Failures here never fail the playlist mutation that
//! triggered them.

mod models;
mod notifier;
mod service;

pub use models::{format_duration, now_playing_text, queued_text, REACTION_FAILED};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use service::NotificationService;

#[cfg(test)]
pub(crate) use service::test_support;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification service rejected request: {0}")]
    Rejected(String),
}

use super::NotifierError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Posts a notice and returns its handle when the service provides one.
    async fn post(&self, target: &str, text: &str) -> Result<Option<String>, NotifierError>;

    async fn update(&self, target: &str, handle: &str, text: &str) -> Result<(), NotifierError>;

    async fn react(&self, target: &str, handle: &str, reaction: &str) -> Result<(), NotifierError>;
}

/// Writes notices to the log only.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn post(&self, target: &str, text: &str) -> Result<Option<String>, NotifierError> {
        info!("[notice to {}] {}", target, text);
        Ok(None)
    }

    async fn update(&self, target: &str, handle: &str, text: &str) -> Result<(), NotifierError> {
        info!("[notice {} to {} updated] {}", handle, target, text);
        Ok(())
    }

    async fn react(&self, target: &str, handle: &str, reaction: &str) -> Result<(), NotifierError> {
        info!("[notice {} to {} reaction] {}", handle, target, reaction);
        Ok(())
    }
}

/// Posts notices as JSON to a webhook:
/// `{"action": "post"|"update"|"react", "target", "handle", "text", "reaction"}`.
/// A `post` response may carry `{"handle": "..."}`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct PostResponse {
    #[serde(default)]
    handle: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout_sec: u64) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    async fn send(&self, body: serde_json::Value) -> Result<reqwest::Response, NotifierError> {
        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(NotifierError::Rejected(format!(
                "{} answered {}",
                self.url,
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn post(&self, target: &str, text: &str) -> Result<Option<String>, NotifierError> {
        let response = self
            .send(json!({"action": "post", "target": target, "text": text}))
            .await?;
        let body: PostResponse = response.json().await.unwrap_or_default();
        Ok(body.handle)
    }

    async fn update(&self, target: &str, handle: &str, text: &str) -> Result<(), NotifierError> {
        self.send(json!({"action": "update", "target": target, "handle": handle, "text": text}))
            .await?;
        Ok(())
    }

    async fn react(&self, target: &str, handle: &str, reaction: &str) -> Result<(), NotifierError> {
        self.send(json!({
            "action": "react",
            "target": target,
            "handle": handle,
            "reaction": reaction
        }))
        .await?;
        Ok(())
    }
}

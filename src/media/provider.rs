//! HTTP client for the external media metadata service.

use super::models::MediaMetadata;
use super::MediaError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Resolves a content link into title, duration, download candidates
    /// and related suggestions.
    async fn fetch_metadata(&self, link: &str) -> Result<MediaMetadata, MediaError>;
}

pub struct HttpMediaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMediaProvider {
    /// # Arguments
    /// * `base_url` - Base URL of the metadata service (e.g., "http://localhost:8090")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: &str, timeout_sec: u64) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaProvider for HttpMediaProvider {
    async fn fetch_metadata(&self, link: &str) -> Result<MediaMetadata, MediaError> {
        let url = format!("{}/v1/metadata", self.base_url);
        debug!("Fetching metadata for {}", link);
        let response = self
            .client
            .get(&url)
            .query(&[("link", link)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MediaError::Provider(format!(
                "metadata request for {} failed with status {}",
                link,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

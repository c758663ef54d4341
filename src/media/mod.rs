//! Boundary with the external media pipeline: metadata lookup, stream
//! fetching and loudness normalization.

mod fetcher;
mod models;
mod normalizer;
mod provider;

pub use fetcher::{media_filename, FfmpegFetcher, MediaFetcher};
pub use models::{DownloadCandidate, MediaMetadata};
pub use normalizer::{normalized_path, FfmpegNormalizer, LoudnessNormalizer, NORMALIZED_DIR};
pub use provider::{HttpMediaProvider, MediaProvider};

use crate::error::JukeboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no download candidate for {0}")]
    NoCandidate(String),

    #[error("{program} failed: {message}")]
    Process { program: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

impl From<MediaError> for JukeboxError {
    fn from(err: MediaError) -> Self {
        JukeboxError::Pipeline(err.to_string())
    }
}

//! Download and transcode of media streams with ffmpeg.

use super::MediaError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const MAX_TITLE_CHARS: usize = 80;

lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r"[^\p{L}\p{N}_-]+").unwrap();
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Streams `source_url` into an ogg file at `output`.
    async fn fetch(&self, source_url: &str, output: &Path) -> Result<(), MediaError>;
}

pub struct FfmpegFetcher {
    ffmpeg_path: PathBuf,
    audio_quality: u8,
}

impl FfmpegFetcher {
    pub fn new(ffmpeg_path: PathBuf, audio_quality: u8) -> Self {
        Self {
            ffmpeg_path,
            audio_quality,
        }
    }
}

#[async_trait]
impl MediaFetcher for FfmpegFetcher {
    async fn fetch(&self, source_url: &str, output: &Path) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = Command::new(&self.ffmpeg_path)
            .args(["-y", "-i", source_url, "-vn", "-acodec", "libvorbis", "-aq"])
            .arg(self.audio_quality.to_string())
            .args(["-f", "ogg"])
            .arg(output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            let _ = tokio::fs::remove_file(output).await;
            return Err(MediaError::Process {
                program: self.ffmpeg_path.display().to_string(),
                message: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Builds a unique `{title}_{uuid}.ogg` file name with filesystem-safe
/// characters only.
pub fn media_filename(title: &str) -> String {
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(title.trim(), "_");
    let sanitized: String = sanitized
        .trim_matches('_')
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();
    let stem = if sanitized.is_empty() {
        "media".to_string()
    } else {
        sanitized
    };
    format!("{}_{}.ogg", stem, uuid::Uuid::new_v4())
}

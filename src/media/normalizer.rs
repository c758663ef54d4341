//! Loudness normalization through the `ffmpeg-normalize` tool.

use super::MediaError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub const NORMALIZED_DIR: &str = "normalized";

#[async_trait]
pub trait LoudnessNormalizer: Send + Sync {
    /// Writes a loudness-normalized copy of `source` to `output`.
    async fn normalize(&self, source: &Path, output: &Path) -> Result<(), MediaError>;
}

pub struct FfmpegNormalizer {
    binary: PathBuf,
    target_loudness: f64,
}

impl FfmpegNormalizer {
    pub fn new(binary: PathBuf, target_loudness: f64) -> Self {
        Self {
            binary,
            target_loudness,
        }
    }
}

#[async_trait]
impl LoudnessNormalizer for FfmpegNormalizer {
    async fn normalize(&self, source: &Path, output: &Path) -> Result<(), MediaError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = Command::new(&self.binary)
            .arg(source)
            .arg("-t")
            .arg(self.target_loudness.to_string())
            .args(["-c:a", "libvorbis", "-ext", "ogg", "-o"])
            .arg(output)
            .args(["-v", "-f"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            return Err(MediaError::Process {
                program: self.binary.display().to_string(),
                message: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// `<dir>/normalized/<stem>.ogg` for a prepared media file name.
pub fn normalized_path(download_dir: &Path, filename: &str) -> PathBuf {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    download_dir
        .join(NORMALIZED_DIR)
        .join(format!("{}.ogg", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_path_is_sibling_dir() {
        let path = normalized_path(Path::new("/data/media"), "Song_1234.ogg");
        assert_eq!(path, PathBuf::from("/data/media/normalized/Song_1234.ogg"));
    }
}

use super::dispatcher::JobExecutor;
use super::models::{Job, JobKind};
use crate::error::{JukeboxError, JukeboxResult};
use crate::media::{normalized_path, LoudnessNormalizer, MediaError};
use crate::queue_store::MediaStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Produces `<download dir>/normalized/<stem>.ogg` for prepared media.
///
/// Missing media or a missing source file is not an error: there is simply
/// nothing to normalize. An absent or empty output file fails the job and
/// the partial output is removed; the original file stays playable.
pub struct NormalizeExecutor {
    normalizer: Arc<dyn LoudnessNormalizer>,
    media_store: Arc<dyn MediaStore>,
    download_dir: PathBuf,
}

impl NormalizeExecutor {
    pub fn new(
        normalizer: Arc<dyn LoudnessNormalizer>,
        media_store: Arc<dyn MediaStore>,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            normalizer,
            media_store,
            download_dir,
        }
    }
}

async fn remove_partial(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial output {}: {}", output.display(), e);
        }
    }
}

async fn check_output(output: &Path) -> Result<(), MediaError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(MediaError::InvalidOutput(format!(
            "{} is empty",
            output.display()
        ))),
        Err(_) => Err(MediaError::InvalidOutput(format!(
            "{} was not created",
            output.display()
        ))),
    }
}

#[async_trait]
impl JobExecutor for NormalizeExecutor {
    fn kind(&self) -> JobKind {
        JobKind::Normalize
    }

    async fn execute(&self, job: &Job) -> JukeboxResult<()> {
        let media_id = job.media_id.as_deref().ok_or_else(|| {
            JukeboxError::Invalid(format!("normalize job {} has no media", job.id))
        })?;
        let Some(media) = self.media_store.get_media(media_id)? else {
            info!("Media {} is gone, nothing to normalize", media_id);
            return Ok(());
        };
        let Some(filename) = media.filename.as_deref() else {
            info!("Media {} has no file yet, nothing to normalize", media_id);
            return Ok(());
        };
        let source = self.download_dir.join(filename);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            warn!("Source file {} is missing, skipping", source.display());
            return Ok(());
        }

        let output = normalized_path(&self.download_dir, filename);
        let result = match self.normalizer.normalize(&source, &output).await {
            Ok(()) => check_output(&output).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            remove_partial(&output).await;
            return Err(e.into());
        }

        self.media_store.set_normalized(&media.id, true)?;
        info!("Normalized media {} into {}", media.id, output.display());
        Ok(())
    }
}

// Orchestrator - one remux run per request, classified into a DownloadResult
//
// Pending → Invoking → Success | Failed | Skipped. No retry at this layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::errors::DownloadError;
use super::models::{DownloadRequest, DownloadResult, Quality, SkipReason};
use super::tools::is_executable;
use super::traits::DownloaderBackend;
use super::utils::{reserve_unique_path, sanitize_filename};
use super::vod_url::VodId;

/// Result of one download plus whether content may be missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub result: DownloadResult,
    /// A part ended early; the file exists but is shorter than advertised
    pub partial: bool,
}

impl From<DownloadResult> for DownloadOutcome {
    fn from(result: DownloadResult) -> Self {
        Self {
            result,
            partial: false,
        }
    }
}

pub struct Downloader {
    backend: Arc<dyn DownloaderBackend>,
}

impl Downloader {
    pub fn new(backend: Arc<dyn DownloaderBackend>) -> Self {
        Self { backend }
    }

    /// Run the backend into a hidden staging file next to the destination and
    /// move it into place only once it verifies. On any other outcome the
    /// staging file is removed, and so is an empty claim at the destination.
    pub async fn download(&self, request: &DownloadRequest, cancel: &CancellationToken) -> DownloadOutcome {
        let outcome = self.run(request, cancel).await;
        if !outcome.result.is_success() {
            remove_if_empty(&request.destination).await;
        }
        outcome
    }

    async fn run(&self, request: &DownloadRequest, cancel: &CancellationToken) -> DownloadOutcome {
        if cancel.is_cancelled() {
            return DownloadResult::Skipped(SkipReason::Cancelled).into();
        }

        if !is_executable(&request.tool_path) {
            return DownloadResult::Skipped(SkipReason::ToolUnavailable(format!(
                "{} is missing or not executable",
                request.tool_path.display()
            )))
            .into();
        }

        if let Some(parent) = request.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return DownloadResult::Failed(err.into()).into();
            }
        }

        let staging = staging_path_for(&request.destination);
        let staged = DownloadRequest {
            destination: staging.clone(),
            ..request.clone()
        };

        debug!(
            vod_id = %request.vod_id,
            backend = self.backend.name(),
            quality = %request.variant.quality,
            path = %staging.display(),
            "invoking"
        );

        let remuxed = match self.backend.remux(&staged, cancel).await {
            Ok(report) => publish(&staging, &request.destination).await.map(|()| report),
            Err(err) => Err(err),
        };

        match remuxed {
            Ok(report) => {
                info!(vod_id = %request.vod_id, path = %request.destination.display(), "saved");
                DownloadOutcome {
                    result: DownloadResult::Success(request.destination.clone()),
                    partial: report.partial,
                }
            }
            Err(err) => {
                discard(&staging).await;
                debug!(vod_id = %request.vod_id, error = %err, "remux failed");
                DownloadResult::from(err).into()
            }
        }
    }
}

/// `.{name}.part` beside the destination
pub fn staging_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let parent = destination.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!(".{}.part", name))
}

/// Success requires a non-empty staging file; it then replaces the destination
async fn publish(staging: &Path, destination: &Path) -> Result<(), DownloadError> {
    match tokio::fs::metadata(staging).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        Ok(_) => {
            return Err(DownloadError::IncompleteOutput(format!(
                "{} is empty",
                destination.display()
            )))
        }
        Err(_) => {
            return Err(DownloadError::IncompleteOutput(format!(
                "{} was not created",
                destination.display()
            )))
        }
    }

    tokio::fs::rename(staging, destination).await.map_err(|e| {
        DownloadError::Io(format!(
            "cannot move {} to {}: {}",
            staging.display(),
            destination.display(),
            e
        ))
    })
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed unfinished output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "could not remove unfinished output"),
    }
}

async fn remove_if_empty(path: &Path) {
    if let Ok(meta) = tokio::fs::metadata(path).await {
        if meta.is_file() && meta.len() == 0 {
            if let Err(err) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %err, "could not remove empty output");
            }
        }
    }
}

/// Claim `"{title} ({quality}).mp4"` inside `output_dir`, never an existing file
pub async fn reserve_destination(
    output_dir: &Path,
    title: &str,
    id: &VodId,
    quality: Quality,
) -> Result<PathBuf, DownloadError> {
    let title = sanitize_filename(title);
    let title = if title.is_empty() { id.to_string() } else { title };
    reserve_unique_path(output_dir, &format!("{} ({})", title, quality), "mp4").await
}

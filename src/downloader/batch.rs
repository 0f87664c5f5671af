// Batch driver - normalize → resolve → select → download for many inputs
//
// Every stage error lands in that entry's result; only an unusable output
// directory or a broken selector invariant aborts the run. Results come back
// in input order, also with several jobs in flight.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::errors::DownloadError;
use super::extractors::ManifestResolver;
use super::format_selector::FormatSelector;
use super::models::{DownloadRequest, DownloadResult, Quality, QualityTarget, SkipReason};
use super::orchestrator::{reserve_destination, Downloader};
use super::tools::is_executable;
use super::vod_url::{normalize, player_url, VodId};

pub const MAX_JOBS: usize = 8;

/// Run-wide settings, fixed before the first entry starts
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub target: QualityTarget,
    pub output_dir: PathBuf,
    pub tool_path: PathBuf,
    pub turbo: bool,
    /// Entries processed concurrently (1..=8)
    pub jobs: usize,
    /// Extra attempts for entries that failed with a retryable error
    pub item_retries: u32,
}

impl BatchOptions {
    pub fn new(output_dir: impl Into<PathBuf>, tool_path: impl Into<PathBuf>) -> Self {
        Self {
            target: QualityTarget::Best,
            output_dir: output_dir.into(),
            tool_path: tool_path.into(),
            turbo: false,
            jobs: 1,
            item_retries: 0,
        }
    }

    pub fn with_target(mut self, target: QualityTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_turbo(mut self, turbo: bool) -> Self {
        self.turbo = turbo;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, MAX_JOBS);
        self
    }

    pub fn with_item_retries(mut self, retries: u32) -> Self {
        self.item_retries = retries;
        self
    }
}

/// Outcome of one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub input: String,
    pub vod_id: Option<VodId>,
    pub title: Option<String>,
    pub quality: Option<Quality>,
    pub result: DownloadResult,
    /// Fallback and partial-content notices
    pub notices: Vec<String>,
}

impl BatchEntry {
    pub fn new(input: String, result: DownloadResult) -> Self {
        Self {
            input,
            vod_id: None,
            title: None,
            quality: None,
            result,
            notices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.result, DownloadResult::Failed(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.result, DownloadResult::Skipped(_)))
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.entries.len()
    }

    /// Any entry stopped or skipped by cancellation
    pub fn was_cancelled(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(
                e.result,
                DownloadResult::Skipped(SkipReason::Cancelled) | DownloadResult::Failed(DownloadError::Cancelled)
            )
        })
    }

    /// Human-readable summary, one line per entry
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Summary: {} succeeded, {} failed, {} skipped",
            self.succeeded(),
            self.failed(),
            self.skipped()
        );

        for entry in &self.entries {
            let name = entry
                .title
                .as_deref()
                .map(str::to_string)
                .or_else(|| entry.vod_id.as_ref().map(|id| id.to_string()))
                .unwrap_or_else(|| entry.input.clone());

            let line = match &entry.result {
                DownloadResult::Success(path) => format!("  [ok]      {} -> {}", name, path.display()),
                DownloadResult::Failed(err) => format!("  [failed]  {} ({}): {}", name, err.kind(), err),
                DownloadResult::Skipped(reason) => format!("  [skipped] {}: {}", name, reason),
            };
            let _ = writeln!(out, "{}", line);

            for notice in &entry.notices {
                let _ = writeln!(out, "            note: {}", notice);
            }
        }

        out
    }
}

pub struct BatchDriver {
    resolver: Arc<ManifestResolver>,
    downloader: Arc<Downloader>,
    options: BatchOptions,
}

impl BatchDriver {
    pub fn new(resolver: Arc<ManifestResolver>, downloader: Arc<Downloader>, options: BatchOptions) -> Self {
        Self {
            resolver,
            downloader,
            options,
        }
    }

    pub async fn run(&self, entries: Vec<String>, cancel: &CancellationToken) -> Result<BatchReport, DownloadError> {
        if entries.is_empty() {
            return Ok(BatchReport::default());
        }

        tokio::fs::create_dir_all(&self.options.output_dir).await.map_err(|e| {
            DownloadError::Io(format!(
                "cannot create output directory {}: {}",
                self.options.output_dir.display(),
                e
            ))
        })?;

        let tool_reported = AtomicBool::new(false);
        if !is_executable(&self.options.tool_path) {
            self.report_tool_unavailable(&tool_reported);
        }

        let total = entries.len();
        info!(total, jobs = self.options.jobs, target = %self.options.target, "starting batch");

        let entries: Vec<BatchEntry> = stream::iter(entries.into_iter().enumerate())
            .map(|(index, input)| self.process(index + 1, total, input, cancel, &tool_reported))
            .buffered(self.options.jobs.clamp(1, MAX_JOBS))
            .try_collect()
            .await?;

        Ok(BatchReport { entries })
    }

    fn report_tool_unavailable(&self, reported: &AtomicBool) {
        if !reported.swap(true, Ordering::SeqCst) {
            error!(
                path = %self.options.tool_path.display(),
                "ffmpeg is unavailable; downloads will be skipped (install it or pass --ffmpeg)"
            );
        }
    }

    async fn process(
        &self,
        position: usize,
        total: usize,
        input: String,
        cancel: &CancellationToken,
        tool_reported: &AtomicBool,
    ) -> Result<BatchEntry, DownloadError> {
        if cancel.is_cancelled() {
            return Ok(BatchEntry::new(input, DownloadResult::Skipped(SkipReason::Cancelled)));
        }

        let id = match normalize(&input) {
            Ok(id) => id,
            Err(err) => {
                warn!(position, total, %input, error = %err, "skipping malformed input");
                return Ok(BatchEntry::new(input, DownloadResult::Failed(err)));
            }
        };

        info!(position, total, vod_id = %id, "processing");

        let mut attempt = 0;
        let entry = loop {
            let entry = self.attempt(&input, &id, cancel).await?;
            let retryable = entry.result.error().map_or(false, DownloadError::is_retryable);
            if !retryable || attempt >= self.options.item_retries {
                break entry;
            }
            attempt += 1;
            warn!(vod_id = %id, attempt, "retrying entry after a network error");
        };

        match &entry.result {
            DownloadResult::Success(path) => info!(position, total, vod_id = %id, path = %path.display(), "done"),
            DownloadResult::Failed(err) if err.is_systemic() => {
                error!(position, total, vod_id = %id, error = %err, "failed")
            }
            DownloadResult::Failed(err) => warn!(position, total, vod_id = %id, error = %err, "failed"),
            DownloadResult::Skipped(SkipReason::ToolUnavailable(_)) => self.report_tool_unavailable(tool_reported),
            DownloadResult::Skipped(SkipReason::Cancelled) => info!(vod_id = %id, "cancelled"),
        }

        Ok(entry)
    }

    /// One pass through resolve → select → download
    async fn attempt(&self, input: &str, id: &VodId, cancel: &CancellationToken) -> Result<BatchEntry, DownloadError> {
        let mut entry = BatchEntry::new(input.to_string(), DownloadResult::Skipped(SkipReason::Cancelled));
        entry.vod_id = Some(id.clone());

        let resolved = tokio::select! {
            resolved = self.resolver.resolve(id) => resolved,
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
        };
        let metadata = match resolved {
            Ok(metadata) => metadata,
            Err(err) => {
                entry.result = DownloadResult::Failed(err);
                return Ok(entry);
            }
        };
        entry.title = Some(metadata.title.clone());

        // An empty variant set here is a resolver bug; abort the run
        let selection = match FormatSelector::select(&metadata.variants, &self.options.target) {
            Ok(selection) => selection,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                entry.result = DownloadResult::Failed(err);
                return Ok(entry);
            }
        };
        if let Some(notice) = selection.notice() {
            info!(vod_id = %id, %notice, "quality fallback");
            entry.notices.push(notice);
        }
        let variant = selection.variant.clone();
        entry.quality = Some(variant.quality);

        // Claimed up front so entries running side by side never share a file
        let destination =
            match reserve_destination(&self.options.output_dir, &metadata.title, id, variant.quality).await {
                Ok(destination) => destination,
                Err(err) => {
                    entry.result = DownloadResult::Failed(err);
                    return Ok(entry);
                }
            };

        let request = DownloadRequest {
            vod_id: id.clone(),
            destination,
            variant,
            tool_path: self.options.tool_path.clone(),
            headers: self.resolver.stream_headers(),
            turbo: self.options.turbo,
        };
        info!(
            vod_id = %id,
            page = %player_url(id),
            title = %metadata.title,
            duration = %metadata.duration_display(),
            quality = %request.variant.quality,
            parts = request.variant.segments.len(),
            "downloading"
        );

        let outcome = self.downloader.download(&request, cancel).await;
        if outcome.partial {
            entry
                .notices
                .push("part of the VOD ended early; the file may be incomplete".to_string());
        }
        entry.result = outcome.result;
        Ok(entry)
    }
}

/// Read a batch file: one URL or id per line, blank lines ignored
pub async fn read_batch_file(path: &Path) -> Result<Vec<String>, DownloadError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DownloadError::Io(format!("cannot read batch file {}: {}", path.display(), e)))?;
    Ok(parse_batch(&contents))
}

pub fn parse_batch(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

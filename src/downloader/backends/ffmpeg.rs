use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::downloader::errors::DownloadError;
use crate::downloader::extractors::analyze_error;
use crate::downloader::models::{DownloadRequest, StreamSegment};
use crate::downloader::traits::{DownloaderBackend, ProgressEmitter, RemuxReport};
use crate::downloader::utils::{concat_list_entry, run_tool, ToolRun};

/// A part may end this much earlier than advertised before it counts as cut short
pub const EARLY_END_TOLERANCE_MS: u64 = 160;

/// Remuxes HLS variants into MP4 with ffmpeg stream copy
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }

    fn header_args(headers: &[(String, String)]) -> Vec<String> {
        if headers.is_empty() {
            return Vec::new();
        }
        let joined: String = headers
            .iter()
            .map(|(k, v)| format!("{}: {}\r\n", k, v))
            .collect();
        vec!["-headers".to_string(), joined]
    }

    fn part_args(request: &DownloadRequest, url: &str, output: &Path) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string()];
        args.extend(Self::header_args(&request.headers));
        args.extend(
            [
                "-i", url, "-c", "copy", "-movflags", "faststart+frag_keyframe", "-f", "mp4", "-v",
                "error", "-progress", "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        if request.turbo {
            args.extend(["-threads".to_string(), "0".to_string()]);
        }
        args.push("-y".to_string());
        args.push(output.display().to_string());
        args
    }

    fn concat_args(request: &DownloadRequest, list: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner", "-f", "concat", "-safe", "0", "-i",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(list.display().to_string());
        args.extend(
            ["-c", "copy", "-movflags", "+faststart", "-f", "mp4", "-v", "error", "-progress", "pipe:1"]
                .iter()
                .map(|s| s.to_string()),
        );
        if request.turbo {
            args.extend(["-threads".to_string(), "0".to_string()]);
        }
        args.push("-y".to_string());
        args.push(request.destination.display().to_string());
        args
    }

    /// Run one ffmpeg invocation; Ok only when the exit status is success
    async fn invoke(
        request: &DownloadRequest,
        args: &[String],
        cancel: &CancellationToken,
        emitter: ProgressEmitter,
    ) -> Result<ToolRun, DownloadError> {
        let run = run_tool(&request.tool_path, args, cancel, Some(emitter)).await?;
        if run.status.success() {
            return Ok(run);
        }
        Err(tool_failure(&run))
    }

    /// Download one segment; returns whether it ended early
    async fn fetch_segment(
        &self,
        request: &DownloadRequest,
        segment: &StreamSegment,
        label: String,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, DownloadError> {
        let args = Self::part_args(request, &segment.url, output);
        let emitter = ProgressEmitter::new(label.clone(), segment.duration_ms);
        let run = Self::invoke(request, &args, cancel, emitter).await?;

        let short = ended_early(segment.duration_ms, run.out_time_ms);
        if short {
            warn!(
                %label,
                expected_ms = segment.duration_ms,
                got_ms = run.out_time_ms.unwrap_or(0),
                "part ended before its advertised duration"
            );
        }
        Ok(short)
    }

    async fn remux_parts(
        &self,
        request: &DownloadRequest,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<RemuxReport, DownloadError> {
        tokio::fs::create_dir_all(work_dir).await?;

        let segments = &request.variant.segments;
        let mut parts = Vec::with_capacity(segments.len());
        let mut report = RemuxReport::default();

        for (index, segment) in segments.iter().enumerate() {
            let part = work_dir.join(format!("part{:03}.mp4", index + 1));
            let label = format!("{} part {}/{}", request.vod_id, index + 1, segments.len());
            info!(%label, "downloading");

            if self
                .fetch_segment(request, segment, label, &part, cancel)
                .await?
            {
                // Later parts would leave a gap; keep what is contiguous
                report.partial = true;
                parts.push(part);
                break;
            }
            parts.push(part);
        }

        let list = work_dir.join("concat.txt");
        let contents: String = parts
            .iter()
            .map(|p| concat_list_entry(&absolute(p)) + "\n")
            .collect();
        tokio::fs::write(&list, contents).await?;

        info!(vod_id = %request.vod_id, parts = parts.len(), "joining parts");
        let total_ms = segments.iter().map(|s| s.duration_ms).sum();
        let emitter = ProgressEmitter::new(format!("{} join", request.vod_id), total_ms);
        Self::invoke(request, &Self::concat_args(request, &list), cancel, emitter).await?;

        Ok(report)
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DownloaderBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn remux(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<RemuxReport, DownloadError> {
        match request.variant.segments.as_slice() {
            [] => Err(DownloadError::InvariantViolation(format!(
                "variant {} of VOD {} has no segments",
                request.variant.quality, request.vod_id
            ))),
            [segment] => {
                let label = format!("{} {}", request.vod_id, request.variant.quality);
                let partial = self
                    .fetch_segment(request, segment, label, &request.destination, cancel)
                    .await?;
                Ok(RemuxReport { partial })
            }
            _ => {
                let work_dir = work_dir_for(&request.destination);
                let result = self.remux_parts(request, &work_dir, cancel).await;

                match tokio::fs::remove_dir_all(&work_dir).await {
                    Ok(()) => debug!(dir = %work_dir.display(), "removed working files"),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => warn!(
                        dir = %work_dir.display(),
                        error = %err,
                        "could not remove temporary part files; delete the directory manually"
                    ),
                }

                result
            }
        }
    }
}

/// Directory beside the output file holding the parts
pub fn work_dir_for(destination: &Path) -> PathBuf {
    destination.with_extension("parts")
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn ended_early(expected_ms: u64, got_ms: Option<u64>) -> bool {
    match got_ms {
        Some(got) if expected_ms > EARLY_END_TOLERANCE_MS => got < expected_ms - EARLY_END_TOLERANCE_MS,
        _ => false,
    }
}

fn tool_failure(run: &ToolRun) -> DownloadError {
    let tail = run.stderr_tail.join("\n");
    let diagnostics = analyze_error(&tail);

    let mut diagnostic = tail.clone();
    if diagnostics.reason.hint().is_some() {
        if !diagnostic.is_empty() {
            diagnostic.push('\n');
        }
        diagnostic.push_str("hint: ");
        diagnostic.push_str(&diagnostics.summary());
    }

    let message = match diagnostics.context.or_else(|| run.stderr_tail.last().cloned()) {
        Some(line) => format!("ffmpeg exited with {}: {}", run.status, line),
        None => format!("ffmpeg exited with {}", run.status),
    };

    DownloadError::ToolFailed { message, diagnostic }
}

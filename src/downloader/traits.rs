// Downloader backend trait definition

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::errors::DownloadError;
use super::models::{DownloadProgress, DownloadRequest};

/// What a finished remux reports besides the output file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemuxReport {
    /// At least one part ended before its advertised duration
    pub partial: bool,
}

/// Trait for downloader backend implementations
#[async_trait]
pub trait DownloaderBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Fetch every segment of the requested variant and write one MP4 to
    /// `request.destination`. The child process must be reaped before
    /// returning, also on cancellation.
    async fn remux(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<RemuxReport, DownloadError>;
}

/// Progress emitter helper: logs every 10% at info, each update at debug
pub struct ProgressEmitter {
    label: String,
    total_ms: u64,
    last_step: Option<u32>,
}

impl ProgressEmitter {
    pub fn new(label: impl Into<String>, total_ms: u64) -> Self {
        Self {
            label: label.into(),
            total_ms,
            last_step: None,
        }
    }

    /// Report the current output position in milliseconds
    pub fn update(&mut self, out_time_ms: u64) {
        if self.total_ms == 0 {
            debug!(label = %self.label, out_time_ms, "progress");
            return;
        }

        let percent = (out_time_ms as f64 / self.total_ms as f64 * 100.0).clamp(0.0, 100.0) as f32;
        self.emit(DownloadProgress {
            percent,
            status: format!("{} / {} ms", out_time_ms, self.total_ms),
        });
    }

    pub fn emit(&mut self, progress: DownloadProgress) {
        debug!(label = %self.label, percent = progress.percent, status = %progress.status, "progress");

        let step = (progress.percent / 10.0).floor() as u32;
        if self.last_step.map_or(true, |last| step > last) {
            self.last_step = Some(step);
            info!(label = %self.label, "{:>3}%", step * 10);
        }
    }

    /// Last logged 10% step, for tests
    pub fn last_step(&self) -> Option<u32> {
        self.last_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_steps() {
        let mut emitter = ProgressEmitter::new("part 1", 10_000);
        emitter.update(0);
        assert_eq!(emitter.last_step(), Some(0));
        emitter.update(950);
        assert_eq!(emitter.last_step(), Some(0));
        emitter.update(2_500);
        assert_eq!(emitter.last_step(), Some(2));
        emitter.update(1_000);
        assert_eq!(emitter.last_step(), Some(2));
        emitter.update(20_000);
        assert_eq!(emitter.last_step(), Some(10));
    }

    #[test]
    fn test_unknown_total_only_debug_logs() {
        let mut emitter = ProgressEmitter::new("concat", 0);
        emitter.update(5_000);
        assert_eq!(emitter.last_step(), None);
    }
}

// Helper functions for backend implementations

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use regex::Regex;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::DownloadError;
use super::traits::ProgressEmitter;

/// Lines of stderr kept for failure diagnostics
pub const STDERR_TAIL_LINES: usize = 20;

/// Run command with timeout (shared utility)
pub async fn run_output_with_timeout(
    program: &Path,
    args: &[&str],
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Io(format!("failed to capture stdout from {}", program.display())))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Io(format!("failed to capture stderr from {}", program.display())))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res?;
            let stdout = stdout_task
                .await
                .map_err(|e| DownloadError::Io(format!("stdout task failed: {}", e)))??;
            let stderr = stderr_task
                .await
                .map_err(|e| DownloadError::Io(format!("stderr task failed: {}", e)))??;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::ToolFailed {
                message: format!("{} timed out after {}s", program.display(), timeout_secs),
                diagnostic: String::new(),
            })
        }
    }
}

/// Outcome of a finished tool invocation
#[derive(Debug)]
pub struct ToolRun {
    pub status: ExitStatus,
    /// Last stderr lines, oldest first
    pub stderr_tail: Vec<String>,
    /// Last `out_time_ms` reported on the progress pipe, in milliseconds
    pub out_time_ms: Option<u64>,
}

/// Run a tool that writes `-progress pipe:1` blocks to stdout.
///
/// The child is killed when dropped. On cancellation it is killed and
/// reaped before `Cancelled` is returned.
pub async fn run_tool(
    program: &Path,
    args: &[String],
    cancel: &CancellationToken,
    mut progress: Option<ProgressEmitter>,
) -> Result<ToolRun, DownloadError> {
    if cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }

    debug!(program = %program.display(), ?args, "spawning");

    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Io(format!("failed to capture stdout from {}", program.display())))?;
    let stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Io(format!("failed to capture stderr from {}", program.display())))?;

    let progress_reader = tokio::spawn(async move {
        let mut out_time_ms = None;
        let mut lines = BufReader::new(stdout_pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_progress_line(&line) {
                Some(ProgressLine::OutTime(ms)) => {
                    out_time_ms = Some(ms);
                    if let Some(emitter) = progress.as_mut() {
                        emitter.update(ms);
                    }
                }
                // Keep draining so the child never blocks on a full pipe
                Some(ProgressLine::End) => debug!("progress stream ended"),
                None => {}
            }
        }
        out_time_ms
    });

    let stderr_reader = tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut lines = BufReader::new(stderr_pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail)
    });

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            progress_reader.abort();
            stderr_reader.abort();
            debug!(program = %program.display(), "killed on cancellation");
            return Err(DownloadError::Cancelled);
        }
        status = child.wait() => status?,
    };

    // Ctrl-C reaches the child too and may end it before the token fires
    if interrupted(&status, cancel) {
        progress_reader.abort();
        stderr_reader.abort();
        debug!(program = %program.display(), %status, "stopped by interrupt");
        return Err(DownloadError::Cancelled);
    }

    let out_time_ms = progress_reader.await.unwrap_or(None);
    let stderr_tail = stderr_reader.await.unwrap_or_default();

    Ok(ToolRun {
        status,
        stderr_tail,
        out_time_ms,
    })
}

/// A failed exit that came from the user interrupting the run
fn interrupted(status: &ExitStatus, cancel: &CancellationToken) -> bool {
    if status.success() {
        return false;
    }
    if cancel.is_cancelled() {
        return true;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal() == Some(SIGINT)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(unix)]
const SIGINT: i32 = 2;

fn spawn_error(program: &Path, err: std::io::Error) -> DownloadError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => {
            DownloadError::ToolUnavailable(format!("{}: {}", program.display(), err))
        }
        _ => DownloadError::Io(format!("failed to start {}: {}", program.display(), err)),
    }
}

/// One meaningful line of ffmpeg's `-progress` output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLine {
    /// Output position in milliseconds
    OutTime(u64),
    End,
}

/// Parse `out_time_ms=` (microseconds, despite the name) and `progress=end`
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    lazy_static::lazy_static! {
        static ref OUT_TIME_RE: Regex = Regex::new(r"^out_time_ms=(\d+)$").unwrap();
    }

    let line = line.trim();
    if line == "progress=end" {
        return Some(ProgressLine::End);
    }

    OUT_TIME_RE
        .captures(line)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .map(|us| ProgressLine::OutTime(us / 1000))
}

/// Remove characters that are not allowed in file names on common systems
pub fn sanitize_filename(name: &str) -> String {
    lazy_static::lazy_static! {
        static ref FORBIDDEN_RE: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1f\x7f]"#).unwrap();
        static ref SPACES_RE: Regex = Regex::new(r"\s+").unwrap();
    }

    let collapsed = SPACES_RE.replace_all(name.trim(), " ");
    let cleaned = FORBIDDEN_RE.replace_all(&collapsed, "");
    // Windows refuses trailing dots
    cleaned.trim().trim_end_matches('.').trim().to_string()
}

/// Claim the first free name in `dir` for `stem.ext`:
/// `name.mp4`, `name(1).mp4`, `name(2).mp4`, ...
///
/// The claim is an empty file created with `create_new`, so concurrent
/// callers never get the same path.
pub async fn reserve_unique_path(dir: &Path, stem: &str, ext: &str) -> Result<PathBuf, DownloadError> {
    let mut counter = 0u32;
    loop {
        let candidate = if counter == 0 {
            dir.join(format!("{}.{}", stem, ext))
        } else {
            dir.join(format!("{}({}).{}", stem, counter, ext))
        };

        match OpenOptions::new().write(true).create_new(true).open(&candidate).await {
            Ok(_) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(err) => {
                return Err(DownloadError::Io(format!(
                    "cannot create {}: {}",
                    candidate.display(),
                    err
                )))
            }
        }
    }
}

/// Quote a path for an ffmpeg concat list (`file '...'`)
pub fn concat_list_entry(path: &Path) -> String {
    format!("file '{}'", path.display().to_string().replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(
            parse_progress_line("out_time_ms=12345678"),
            Some(ProgressLine::OutTime(12_345))
        );
        assert_eq!(parse_progress_line("progress=end"), Some(ProgressLine::End));
        assert_eq!(parse_progress_line("progress=continue"), None);
        assert_eq!(parse_progress_line("out_time_ms=N/A"), None);
        assert_eq!(parse_progress_line("out_time=00:00:01.000000"), None);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(r#"a/b\c:d*e?f"g<h>i|j"#), "abcdefghij");
        assert_eq!(sanitize_filename("  two   spaces\tand\nbreaks "), "two spaces and breaks");
        assert_eq!(sanitize_filename("ends with dot."), "ends with dot");
        assert_eq!(sanitize_filename("방송 다시보기 [1080p]"), "방송 다시보기 [1080p]");
        assert_eq!(sanitize_filename("???"), "");
    }

    #[tokio::test]
    async fn test_reserve_unique_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = reserve_unique_path(dir.path(), "vod", "mp4").await.unwrap();
        assert_eq!(first, dir.path().join("vod.mp4"));
        assert_eq!(std::fs::metadata(&first).unwrap().len(), 0);

        // The empty claim alone is enough to move the next caller on
        let second = reserve_unique_path(dir.path(), "vod", "mp4").await.unwrap();
        assert_eq!(second, dir.path().join("vod(1).mp4"));
        assert_eq!(
            reserve_unique_path(dir.path(), "vod", "mp4").await.unwrap(),
            dir.path().join("vod(2).mp4")
        );
    }

    #[tokio::test]
    async fn test_concurrent_reservations_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let claims = futures::future::join_all(
            (0..4).map(|_| reserve_unique_path(dir.path(), "same", "mp4")),
        )
        .await;

        let mut paths: Vec<PathBuf> = claims.into_iter().map(Result::unwrap).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4);
    }

    #[tokio::test]
    async fn test_reserve_in_missing_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = reserve_unique_path(&dir.path().join("missing"), "vod", "mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Io(_)));
    }

    #[test]
    fn test_concat_list_entry_escapes_quotes() {
        assert_eq!(
            concat_list_entry(Path::new("/tmp/it's/part1.mp4")),
            r"file '/tmp/it'\''s/part1.mp4'"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_output_with_timeout() {
        let output = run_output_with_timeout(Path::new("sh"), &["-c", "echo hello"], 5)
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_exit_after_cancel_is_interrupt() {
        let status = std::process::Command::new("sh").args(["-c", "exit 255"]).status().unwrap();
        let cancel = CancellationToken::new();
        assert!(!interrupted(&status, &cancel));

        cancel.cancel();
        assert!(interrupted(&status, &cancel));

        let ok = std::process::Command::new("sh").args(["-c", "exit 0"]).status().unwrap();
        assert!(!interrupted(&ok, &cancel));
    }

    #[cfg(unix)]
    #[test]
    fn test_sigint_exit_is_interrupt() {
        let status = std::process::Command::new("sh")
            .args(["-c", "kill -INT $$"])
            .status()
            .unwrap();
        assert!(interrupted(&status, &CancellationToken::new()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_wins_over_exit() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(TokioDuration::from_millis(100)).await;
            trigger.cancel();
        });

        let args = vec!["-c".to_string(), "exec sleep 5".to_string()];
        let err = run_tool(Path::new("sh"), &args, &cancel, None).await.unwrap_err();
        assert_eq!(err, DownloadError::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_unavailable() {
        let cancel = CancellationToken::new();
        let err = run_tool(Path::new("/nonexistent/ffmpeg-xyz"), &[], &cancel, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolUnavailable(_)));
    }
}

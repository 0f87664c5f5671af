// ToolManager - locating and probing the ffmpeg binary

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::errors::DownloadError;
use super::utils::run_output_with_timeout;

pub const FFMPEG: &str = "ffmpeg";

const VERSION_PROBE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub is_available: bool,
    /// Built from an unreleased git snapshot
    pub is_snapshot: bool,
}

pub struct ToolManager {
    binary_name: String,
}

impl ToolManager {
    pub fn new() -> Self {
        Self {
            binary_name: FFMPEG.to_string(),
        }
    }

    /// Resolve the tool path.
    ///
    /// A configured value containing a path separator must point at an
    /// executable file. A bare name (or nothing) is looked up in common
    /// install locations, then on PATH.
    pub fn locate(&self, configured: Option<&Path>) -> Result<PathBuf, DownloadError> {
        let wanted = configured.unwrap_or_else(|| Path::new(&self.binary_name));

        if wanted.components().count() > 1 || wanted.is_absolute() {
            if is_executable(wanted) {
                return Ok(wanted.to_path_buf());
            }
            return Err(DownloadError::ToolUnavailable(format!(
                "{} is not an executable file",
                wanted.display()
            )));
        }

        let name = wanted.to_string_lossy();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", name),
            format!("/usr/local/bin/{}", name),
            format!("/usr/bin/{}", name),
        ];
        if let Some(found) = common_paths.iter().map(PathBuf::from).find(|p| is_executable(p)) {
            return Ok(found);
        }

        // 2. Try PATH
        find_in_path(&name).ok_or_else(|| {
            DownloadError::ToolUnavailable(format!(
                "{} not found; install it or pass its path with --ffmpeg",
                name
            ))
        })
    }

    /// Run `<tool> -version` and return the first line
    pub async fn probe_version(&self, path: &Path) -> Result<String, DownloadError> {
        let output = run_output_with_timeout(path, &["-version"], VERSION_PROBE_TIMEOUT_SECS).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or("").trim().to_string();

        if !output.status.success() || !first_line.to_lowercase().contains(&self.binary_name) {
            return Err(DownloadError::ToolUnavailable(format!(
                "{} does not look like {}",
                path.display(),
                self.binary_name
            )));
        }

        debug!(path = %path.display(), version = %first_line, "tool probed");
        Ok(first_line)
    }

    /// Locate and probe; never fails, availability is in the result
    pub async fn get_tool_info(&self, configured: Option<&Path>) -> ToolInfo {
        let mut info = ToolInfo {
            name: self.binary_name.clone(),
            version: None,
            path: None,
            is_available: false,
            is_snapshot: false,
        };

        let path = match self.locate(configured) {
            Ok(path) => path,
            Err(err) => {
                debug!(error = %err, "tool not located");
                return info;
            }
        };

        match self.probe_version(&path).await {
            Ok(version) => {
                info.is_snapshot = is_snapshot_version(&version);
                if info.is_snapshot {
                    warn!(
                        %version,
                        "this ffmpeg is a git snapshot build; if downloads fail, try a release build"
                    );
                }
                info.version = Some(version);
                info.is_available = true;
            }
            Err(err) => warn!(path = %path.display(), error = %err, "version probe failed"),
        }
        info.path = Some(path);
        info
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

/// `ffmpeg version N-113445-g1234abcd ...` or `... version 2024-01-01-git-...`
fn is_snapshot_version(version: &str) -> bool {
    let lower = version.to_lowercase();
    lower
        .split_whitespace()
        .nth(2)
        .map_or(false, |v| v.starts_with("n-") || v.contains("git"))
}

fn find_in_path(tool: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let full = dir.join(tool);
        if is_executable(&full) {
            return Some(full);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{tool}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

/// File exists and (on unix) has an execute bit
pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        true
    }
}

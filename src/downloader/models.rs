// Common data models for the download pipeline

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;
use super::vod_url::VodId;

/// Known quality labels and the height they stand for.
/// Ranking is by height, looked up here, never by comparing label strings.
const QUALITY_LADDER: &[(&str, u32)] = &[
    ("2160p", 2160),
    ("4k", 2160),
    ("uhd", 2160),
    ("1440p", 1440),
    ("2k", 1440),
    ("1080p", 1080),
    ("fhd", 1080),
    ("720p", 720),
    ("hd", 720),
    ("540p", 540),
    ("480p", 480),
    ("sd", 480),
    ("360p", 360),
    ("240p", 240),
    ("144p", 144),
];

/// A resolution tier, e.g. 1080p
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quality {
    height: u32,
}

impl Quality {
    pub fn from_height(height: u32) -> Option<Self> {
        (height > 0).then_some(Self { height })
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Ordinal used for selection
    pub fn rank(&self) -> u32 {
        self.height
    }

    /// Parse a `WIDTHxHEIGHT` resolution string as reported by manifests
    pub fn from_resolution(resolution: &str) -> Option<Self> {
        let (_, height) = resolution.trim().split_once(['x', 'X'])?;
        height.trim().parse().ok().and_then(Self::from_height)
    }
}

impl FromStr for Quality {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();

        if let Some((_, height)) = QUALITY_LADDER.iter().find(|(name, _)| *name == label) {
            return Ok(Self { height: *height });
        }

        if let Some(quality) = Self::from_resolution(&label) {
            return Ok(quality);
        }

        label
            .strip_suffix('p')
            .unwrap_or(&label)
            .parse::<u32>()
            .ok()
            .and_then(Self::from_height)
            .ok_or_else(|| DownloadError::InvalidInput(format!("unknown quality '{}'", s.trim())))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height)
    }
}

/// Requested quality: the best available, or a specific tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityTarget {
    #[default]
    Best,
    Exact(Quality),
}

impl FromStr for QualityTarget {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" | "auto" | "자동" => Ok(Self::Best),
            other => other.parse().map(Self::Exact),
        }
    }
}

impl fmt::Display for QualityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Best => write!(f, "best"),
            Self::Exact(q) => write!(f, "{}", q),
        }
    }
}

/// One consecutive part of a VOD stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSegment {
    pub url: String,
    /// Advertised duration in milliseconds (0 when unknown)
    pub duration_ms: u64,
}

/// One quality encoding of the whole VOD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVariant {
    pub quality: Quality,
    /// Segments in playback order; together they cover the full VOD
    pub segments: Vec<StreamSegment>,
}

impl StreamVariant {
    pub fn new(quality: Quality, segments: Vec<StreamSegment>) -> Self {
        Self { quality, segments }
    }

    pub fn rank(&self) -> u32 {
        self.quality.rank()
    }
}

/// Resolved VOD: title, duration and the available variants
#[derive(Debug, Clone)]
pub struct VodMetadata {
    pub id: VodId,
    pub title: String,
    pub duration_ms: u64,
    /// Sorted by descending rank, unique per quality
    pub variants: Vec<StreamVariant>,
}

impl VodMetadata {
    /// Total duration formatted as H:MM:SS
    pub fn duration_display(&self) -> String {
        let secs = self.duration_ms / 1000;
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Everything the remux backend needs for one invocation
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub vod_id: VodId,
    pub variant: StreamVariant,
    pub destination: PathBuf,
    pub tool_path: PathBuf,
    /// Headers the stream host expects (User-Agent, Referer, Cookie, ...)
    pub headers: Vec<(String, String)>,
    /// Let ffmpeg pick its own thread count
    pub turbo: bool,
}

/// Why an entry was not attempted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    ToolUnavailable(String),
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolUnavailable(detail) => write!(f, "tool unavailable: {}", detail),
            Self::Cancelled => write!(f, "cancelled before start"),
        }
    }
}

/// Terminal outcome of one download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Success(PathBuf),
    Failed(DownloadError),
    Skipped(SkipReason),
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn error(&self) -> Option<&DownloadError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DownloadError> for DownloadResult {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::ToolUnavailable(detail) => Self::Skipped(SkipReason::ToolUnavailable(detail)),
            other => Self::Failed(other),
        }
    }
}

/// Download progress information
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub percent: f32,
    pub status: String,
}

// ManifestSource trait and common types

use std::time::Duration;

use async_trait::async_trait;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::Quality;
use crate::downloader::vod_url::VodId;

/// Configuration for manifest resolution
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Attempts per network call, including the first one
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number
    pub retry_backoff: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl ResolverConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// A signed playlist URL announced for one quality of a part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    /// None when the platform did not say which resolution this is
    pub quality: Option<Quality>,
    pub url: String,
}

/// One part of a VOD as announced by the metadata lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartGrant {
    pub duration_ms: u64,
    /// Per-quality playlists; may be empty when only `playlist_url` is known
    pub renditions: Vec<Rendition>,
    /// Part-level playlist (usually a master playlist)
    pub playlist_url: Option<String>,
}

impl PartGrant {
    /// Playlists the manifest lookup has to visit for this part
    pub fn sources(&self, default_quality: Option<Quality>) -> Vec<Rendition> {
        if !self.renditions.is_empty() {
            return self.renditions.clone();
        }
        self.playlist_url
            .iter()
            .map(|url| Rendition {
                quality: default_quality,
                url: url.clone(),
            })
            .collect()
    }
}

/// Result of the metadata lookup.
///
/// The signed part URLs in here are the session parameters the manifest
/// lookup needs, so `fetch_manifest` cannot be called without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataGrant {
    pub title: String,
    pub duration_ms: u64,
    /// Resolution the platform plays by default; labels media-only playlists
    pub default_quality: Option<Quality>,
    pub parts: Vec<PartGrant>,
}

/// A variant as listed by one part's playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVariant {
    pub quality: Quality,
    pub url: String,
    pub bandwidth: Option<u64>,
}

/// Variants offered for one part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartManifest {
    pub duration_ms: u64,
    pub variants: Vec<RawVariant>,
}

/// Source of VOD metadata and stream manifests
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Name of the source (for logging)
    fn name(&self) -> &'static str;

    /// First phase: title, duration and signed part URLs
    async fn fetch_metadata(&self, id: &VodId) -> Result<MetadataGrant, DownloadError>;

    /// Second phase: variants of every part, in part order
    async fn fetch_manifest(
        &self,
        id: &VodId,
        grant: &MetadataGrant,
    ) -> Result<Vec<PartManifest>, DownloadError>;

    /// Headers the stream host expects when ffmpeg fetches the media
    fn stream_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

// ManifestResolver - two-phase resolution with bounded retry
//
// Strategy:
// 1. Metadata lookup (title, duration, signed part URLs)
// 2. Manifest lookup using the grant from step 1
// 3. Merge the per-part variant lists into whole-VOD variants
//
// Both lookups are idempotent reads; only Transient errors are retried.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::traits::{ManifestSource, MetadataGrant, PartManifest, RawVariant, ResolverConfig};
use crate::downloader::errors::DownloadError;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{Quality, StreamSegment, StreamVariant, VodMetadata};
use crate::downloader::vod_url::VodId;

/// Resolves a VOD id into its metadata and variant list
pub struct ManifestResolver {
    source: Arc<dyn ManifestSource>,
    config: ResolverConfig,
}

impl ManifestResolver {
    pub fn new(source: Arc<dyn ManifestSource>) -> Self {
        Self {
            source,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Headers ffmpeg has to send to the stream host
    pub fn stream_headers(&self) -> Vec<(String, String)> {
        self.source.stream_headers()
    }

    pub async fn resolve(&self, id: &VodId) -> Result<VodMetadata, DownloadError> {
        let result = self.resolve_inner(id).await;

        if let Err(DownloadError::Protocol(detail)) = &result {
            error!(
                vod_id = %id,
                source = self.source.name(),
                %detail,
                "unexpected platform response; the API may have changed"
            );
        }

        result
    }

    async fn resolve_inner(&self, id: &VodId) -> Result<VodMetadata, DownloadError> {
        let grant = self
            .with_retry(id, "metadata", || self.source.fetch_metadata(id))
            .await?;
        debug!(vod_id = %id, title = %grant.title, parts = grant.parts.len(), "metadata resolved");

        let parts = self
            .with_retry(id, "manifest", || self.source.fetch_manifest(id, &grant))
            .await?;

        let variants = merge_parts(id, &grant, parts)?;
        info!(
            vod_id = %id,
            title = %grant.title,
            qualities = %FormatSelector::describe(&variants),
            "resolved"
        );

        Ok(VodMetadata {
            id: id.clone(),
            title: grant.title,
            duration_ms: grant.duration_ms,
            variants,
        })
    }

    async fn with_retry<T, F, Fut>(
        &self,
        id: &VodId,
        stage: &'static str,
        mut call: F,
    ) -> Result<T, DownloadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DownloadError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(vod_id = %id, stage, attempt, error = %err, "request failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Combine per-part variants into whole-VOD variants.
///
/// A quality must exist in every part to be offered; within one part the
/// entry with the highest bandwidth wins. Result is sorted best first.
pub fn merge_parts(
    id: &VodId,
    grant: &MetadataGrant,
    parts: Vec<PartManifest>,
) -> Result<Vec<StreamVariant>, DownloadError> {
    if parts.is_empty() {
        return Err(DownloadError::NoStreams(id.to_string()));
    }

    let part_count = parts.len();
    let mut by_quality: BTreeMap<Quality, Vec<Option<StreamSegment>>> = BTreeMap::new();

    for (index, part) in parts.into_iter().enumerate() {
        for (quality, variant) in best_per_quality(part.variants) {
            let slots = by_quality
                .entry(quality)
                .or_insert_with(|| vec![None; part_count]);
            slots[index] = Some(StreamSegment {
                url: variant.url,
                duration_ms: part.duration_ms,
            });
        }
    }

    let mut variants = Vec::new();
    for (quality, slots) in by_quality.into_iter().rev() {
        let present = slots.iter().filter(|s| s.is_some()).count();
        if present < part_count {
            warn!(
                vod_id = %id,
                %quality,
                present,
                parts = part_count,
                "quality missing from some parts, dropping it"
            );
            continue;
        }
        variants.push(StreamVariant::new(quality, slots.into_iter().flatten().collect()));
    }

    if variants.is_empty() {
        debug!(vod_id = %id, title = %grant.title, "no variant covers every part");
        return Err(DownloadError::NoStreams(id.to_string()));
    }

    Ok(variants)
}

fn best_per_quality(variants: Vec<RawVariant>) -> BTreeMap<Quality, RawVariant> {
    let mut best: BTreeMap<Quality, RawVariant> = BTreeMap::new();
    for variant in variants {
        let keep_current = best
            .get(&variant.quality)
            .map_or(false, |current| current.bandwidth.unwrap_or(0) >= variant.bandwidth.unwrap_or(0));
        if !keep_current {
            best.insert(variant.quality, variant);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::extractors::traits::PartGrant;
    use crate::downloader::vod_url::normalize;

    fn q(height: u32) -> Quality {
        Quality::from_height(height).unwrap()
    }

    fn raw(height: u32, url: &str, bandwidth: Option<u64>) -> RawVariant {
        RawVariant {
            quality: q(height),
            url: url.to_string(),
            bandwidth,
        }
    }

    fn grant(parts: usize) -> MetadataGrant {
        MetadataGrant {
            title: "t".into(),
            duration_ms: 0,
            default_quality: None,
            parts: (0..parts)
                .map(|i| PartGrant {
                    duration_ms: 1_000,
                    renditions: Vec::new(),
                    playlist_url: Some(format!("https://cdn/{}.m3u8", i)),
                })
                .collect(),
        }
    }

    #[test]
    fn test_merge_keeps_common_qualities() {
        let id = normalize("1").unwrap();
        let parts = vec![
            PartManifest {
                duration_ms: 60_000,
                variants: vec![raw(1080, "a1080", None), raw(720, "a720", None)],
            },
            PartManifest {
                duration_ms: 30_000,
                variants: vec![raw(720, "b720", None)],
            },
        ];

        let variants = merge_parts(&id, &grant(2), parts).unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].quality, q(720));
        let urls: Vec<_> = variants[0].segments.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, ["a720", "b720"]);
        assert_eq!(variants[0].segments[1].duration_ms, 30_000);
    }

    #[test]
    fn test_merge_sorted_best_first_and_highest_bandwidth() {
        let id = normalize("1").unwrap();
        let parts = vec![PartManifest {
            duration_ms: 1_000,
            variants: vec![
                raw(480, "480", None),
                raw(1080, "1080-low", Some(3_000_000)),
                raw(1080, "1080-high", Some(6_000_000)),
                raw(720, "720", None),
            ],
        }];

        let variants = merge_parts(&id, &grant(1), parts).unwrap();
        let labels: Vec<_> = variants.iter().map(|v| v.quality.to_string()).collect();
        assert_eq!(labels, ["1080p", "720p", "480p"]);
        assert_eq!(variants[0].segments[0].url, "1080-high");
    }

    #[test]
    fn test_merge_empty_is_no_streams() {
        let id = normalize("1").unwrap();
        assert!(matches!(
            merge_parts(&id, &grant(0), Vec::new()),
            Err(DownloadError::NoStreams(_))
        ));

        let parts = vec![PartManifest {
            duration_ms: 1_000,
            variants: Vec::new(),
        }];
        assert!(matches!(
            merge_parts(&id, &grant(1), parts),
            Err(DownloadError::NoStreams(_))
        ));
    }
}

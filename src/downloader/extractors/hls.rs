// HLS playlist parsing for part manifests
//
// A part URL from the metadata lookup points either at a master playlist
// (one #EXT-X-STREAM-INF entry per resolution) or directly at a media
// playlist. Only the variant list is needed; ffmpeg reads the segments.

use url::Url;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::Quality;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsVariant {
    pub quality: Option<Quality>,
    pub bandwidth: Option<u64>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HlsPlaylist {
    Master(Vec<HlsVariant>),
    /// Media playlist with its total duration in milliseconds
    Media { duration_ms: u64 },
}

impl HlsPlaylist {
    /// Parse playlist text; relative URIs are resolved against `base`
    pub fn parse(contents: &str, base: &str) -> Result<Self, DownloadError> {
        if !contents.trim_start().starts_with("#EXTM3U") {
            return Err(DownloadError::Protocol(format!(
                "playlist at {} is missing the #EXTM3U header",
                base
            )));
        }

        let base_url = Url::parse(base)
            .map_err(|e| DownloadError::Protocol(format!("invalid playlist URL {}: {}", base, e)))?;

        let mut variants = Vec::new();
        let mut pending: Option<(Option<Quality>, Option<u64>)> = None;
        let mut media_duration = 0f64;
        let mut is_media = false;

        for line in contents.lines().map(str::trim) {
            if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
                let attrs = parse_attributes(attrs);
                let quality = attribute(&attrs, "RESOLUTION").and_then(Quality::from_resolution);
                let bandwidth = attribute(&attrs, "BANDWIDTH").and_then(|b| b.parse().ok());
                pending = Some((quality, bandwidth));
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                is_media = true;
                let seconds = value.split(',').next().unwrap_or("").trim();
                media_duration += seconds.parse::<f64>().map_err(|_| {
                    DownloadError::Protocol(format!("invalid EXTINF duration '{}'", seconds))
                })?;
            } else if line.starts_with('#') || line.is_empty() {
                continue;
            } else if let Some((quality, bandwidth)) = pending.take() {
                let uri = base_url
                    .join(line)
                    .map_err(|e| DownloadError::Protocol(format!("invalid variant URI '{}': {}", line, e)))?;
                variants.push(HlsVariant {
                    quality,
                    bandwidth,
                    uri: uri.to_string(),
                });
            }
        }

        if !variants.is_empty() {
            return Ok(Self::Master(variants));
        }

        if is_media {
            return Ok(Self::Media {
                duration_ms: (media_duration * 1000.0).round() as u64,
            });
        }

        // A master playlist that lists nothing
        Ok(Self::Master(Vec::new()))
    }
}

/// Split an attribute list, honouring quoted values (`CODECS="avc1,mp4a"`)
fn parse_attributes(list: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in list.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                push_attribute(&mut attrs, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_attribute(&mut attrs, &current);
    attrs
}

fn push_attribute(attrs: &mut Vec<(String, String)>, raw: &str) {
    if let Some((key, value)) = raw.split_once('=') {
        attrs.push((key.trim().to_uppercase(), value.trim().to_string()));
    }
}

fn attribute<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

// SOOP platform source - station view API plus HLS playlists
//
// Phase 1 posts the title number to the view endpoint and reads title,
// duration and the signed playlist URLs of every part. Phase 2 fetches
// those playlists and lists the variants they offer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::diagnostics::{diagnose_error, FailureReason};
use super::hls::HlsPlaylist;
use super::traits::{ManifestSource, MetadataGrant, PartGrant, PartManifest, RawVariant, Rendition};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::Quality;
use crate::downloader::vod_url::VodId;

pub const DEFAULT_VOD_API: &str = "https://api.m.sooplive.co.kr/station/video/a/view";
pub const DEFAULT_LOGIN_API: &str = "https://login.sooplive.co.kr/app/LoginAction.php";
pub const DEFAULT_LOGOUT_API: &str = "https://login.sooplive.co.kr/app/LogOut.php";
pub const DEFAULT_CHECK_API: &str = "https://afevent2.sooplive.co.kr/api/get_private_info.php";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://play.sooplive.co.kr/";
pub const DEFAULT_ORIGIN: &str = "https://play.sooplive.co.kr";

/// Endpoints and request settings for the platform
#[derive(Debug, Clone)]
pub struct SoopConfig {
    pub vod_api: String,
    pub login_api: String,
    pub logout_api: String,
    pub check_api: String,
    pub user_agent: String,
    pub referer: String,
    pub origin: String,
    /// Proxy for API requests (`socks5h://`, `http://`)
    pub proxy: Option<String>,
    /// Per-attempt request timeout
    pub timeout: Duration,
}

impl Default for SoopConfig {
    fn default() -> Self {
        Self {
            vod_api: DEFAULT_VOD_API.to_string(),
            login_api: DEFAULT_LOGIN_API.to_string(),
            logout_api: DEFAULT_LOGOUT_API.to_string(),
            check_api: DEFAULT_CHECK_API.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            proxy: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl SoopConfig {
    /// Point every endpoint at one base URL (used against mock servers)
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.vod_api = format!("{}/station/video/a/view", base);
        self.login_api = format!("{}/app/LoginAction.php", base);
        self.logout_api = format!("{}/app/LogOut.php", base);
        self.check_api = format!("{}/api/get_private_info.php", base);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }
}

/// HTTP client for the platform; holds the login session cookies
pub struct SoopSource {
    pub(super) client: reqwest::Client,
    pub(super) jar: Arc<Jar>,
    pub(super) config: SoopConfig,
}

impl SoopSource {
    pub fn new(config: SoopConfig) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(REFERER, header_value(&config.referer)?);
        headers.insert(ORIGIN, header_value(&config.origin)?);

        let jar = Arc::new(Jar::default());
        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_provider(jar.clone())
            .timeout(config.timeout);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| DownloadError::Config(format!("invalid proxy '{}': {}", proxy, e)))?;
            debug!("using proxy for API requests");
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, jar, config })
    }

    /// GET a playlist and return its body
    async fn fetch_playlist(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::from_status(status.as_u16(), "playlist request"));
        }
        Ok(response.text().await?)
    }

    /// Variants one playlist contributes to a part
    async fn rendition_variants(
        &self,
        source: &Rendition,
        default_quality: Option<Quality>,
    ) -> Result<Vec<RawVariant>, DownloadError> {
        let body = self.fetch_playlist(&source.url).await?;

        match HlsPlaylist::parse(&body, &source.url)? {
            HlsPlaylist::Master(entries) => Ok(entries
                .into_iter()
                .filter_map(|entry| {
                    let Some(quality) = entry.quality else {
                        debug!(uri = %entry.uri, "skipping variant without resolution");
                        return None;
                    };
                    Some(RawVariant {
                        quality,
                        url: entry.uri,
                        bandwidth: entry.bandwidth,
                    })
                })
                .collect()),
            HlsPlaylist::Media { duration_ms } => {
                let Some(quality) = source.quality.or(default_quality) else {
                    warn!(url = %source.url, "media playlist without a known resolution, skipping");
                    return Ok(Vec::new());
                };
                debug!(%quality, duration_ms, "media playlist used as a single variant");
                Ok(vec![RawVariant {
                    quality,
                    url: source.url.clone(),
                    bandwidth: None,
                }])
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue, DownloadError> {
    HeaderValue::from_str(value)
        .map_err(|e| DownloadError::Config(format!("invalid header value '{}': {}", value, e)))
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    result: Option<i64>,
    data: Option<ViewData>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    total_file_duration: Option<u64>,
    file_resolution: Option<String>,
    files: Option<Vec<ViewFile>>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewFile {
    #[serde(default, deserialize_with = "lenient_u64")]
    duration: Option<u64>,
    file: Option<String>,
    #[serde(default)]
    quality_info: Vec<QualityInfo>,
}

#[derive(Debug, Deserialize)]
struct QualityInfo {
    resolution: Option<String>,
    file: Option<String>,
}

/// The API sends numbers either as JSON numbers or as strings
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Number(n)) => Some(n),
        Some(NumberOrString::Float(f)) if f >= 0.0 => Some(f as u64),
        Some(NumberOrString::Text(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Classify a rejection message; rate limits and timeouts stay retryable
fn not_available(id: &VodId, message: Option<&str>) -> DownloadError {
    let message = message.unwrap_or("").trim();
    if message.is_empty() {
        return DownloadError::NotAvailable(format!(
            "VOD {}: the platform returned no data (private, restricted or deleted?)",
            id
        ));
    }

    match diagnose_error(message) {
        Some(reason) if reason.is_retryable() => {
            DownloadError::Transient(format!("VOD {}: {} ({})", id, message, reason.description()))
        }
        Some(reason) if reason.login_might_help() => DownloadError::NotAvailable(format!(
            "VOD {}: {} ({}; try --login)",
            id,
            message,
            reason.description()
        )),
        Some(FailureReason::Unknown) | None => DownloadError::NotAvailable(format!("VOD {}: {}", id, message)),
        Some(reason) => DownloadError::NotAvailable(format!("VOD {}: {} ({})", id, message, reason.description())),
    }
}

/// Turn a decoded view response into a grant
fn grant_from_view(id: &VodId, view: ViewResponse) -> Result<MetadataGrant, DownloadError> {
    let data_message = view.data.as_ref().and_then(|d| d.message.clone());

    if let Some(code) = view.result {
        if code != 1 {
            let message = view.message.or(data_message);
            return Err(not_available(id, message.as_deref()));
        }
    }

    let Some(data) = view.data else {
        return Err(not_available(id, view.message.as_deref()));
    };

    let title = data
        .title
        .ok_or_else(|| DownloadError::Protocol(format!("VOD {}: response has no title", id)))?;
    let files = data
        .files
        .ok_or_else(|| DownloadError::Protocol(format!("VOD {}: response has no file list", id)))?;

    let default_quality = data.file_resolution.as_deref().and_then(Quality::from_resolution);

    let parts: Vec<PartGrant> = files
        .into_iter()
        .map(|file| PartGrant {
            duration_ms: file.duration.unwrap_or(0),
            renditions: file
                .quality_info
                .into_iter()
                .filter_map(|info| {
                    Some(Rendition {
                        quality: info.resolution.as_deref().and_then(Quality::from_resolution),
                        url: info.file.filter(|f| !f.is_empty())?,
                    })
                })
                .collect(),
            playlist_url: file.file.filter(|f| !f.is_empty()),
        })
        .collect();

    let summed: u64 = parts.iter().map(|p| p.duration_ms).sum();

    Ok(MetadataGrant {
        title,
        duration_ms: data.total_file_duration.filter(|d| *d > 0).unwrap_or(summed),
        default_quality,
        parts,
    })
}

#[async_trait]
impl ManifestSource for SoopSource {
    fn name(&self) -> &'static str {
        "soop"
    }

    async fn fetch_metadata(&self, id: &VodId) -> Result<MetadataGrant, DownloadError> {
        debug!(vod_id = %id, url = %self.config.vod_api, "requesting VOD metadata");

        let response = self
            .client
            .post(&self.config.vod_api)
            .form(&[
                ("nTitleNo", id.as_str()),
                ("nApiLevel", "10"),
                ("nPlaylistidx", "0"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::from_status(
                status.as_u16(),
                &format!("metadata lookup for VOD {}", id),
            ));
        }

        let body = response.text().await?;
        let view: ViewResponse = serde_json::from_str(&body)?;
        grant_from_view(id, view)
    }

    async fn fetch_manifest(
        &self,
        id: &VodId,
        grant: &MetadataGrant,
    ) -> Result<Vec<PartManifest>, DownloadError> {
        let mut manifests = Vec::with_capacity(grant.parts.len());

        for (index, part) in grant.parts.iter().enumerate() {
            let sources = part.sources(grant.default_quality);
            if sources.is_empty() {
                return Err(DownloadError::Protocol(format!(
                    "VOD {}: part {} has no playlist URL",
                    id,
                    index + 1
                )));
            }

            let mut variants = Vec::new();
            for source in &sources {
                match self.rendition_variants(source, grant.default_quality).await {
                    Ok(found) => variants.extend(found),
                    // One rejected rendition only removes that quality
                    Err(DownloadError::NotAvailable(reason)) => {
                        warn!(vod_id = %id, part = index + 1, url = %source.url, %reason, "playlist rejected, skipping");
                    }
                    Err(err) => return Err(err),
                }
            }

            manifests.push(PartManifest {
                duration_ms: part.duration_ms,
                variants,
            });
        }

        Ok(manifests)
    }

    fn stream_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.config.user_agent.clone()),
            ("Referer".to_string(), self.config.referer.clone()),
            ("Origin".to_string(), self.config.origin.clone()),
        ];

        let cookies = reqwest::Url::parse(&self.config.referer)
            .ok()
            .and_then(|url| self.jar.cookies(&url))
            .and_then(|value| value.to_str().ok().map(str::to_string));
        if let Some(cookies) = cookies {
            headers.push(("Cookie".to_string(), cookies));
        }

        headers
    }
}

// VOD identifier extraction from player URLs

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::DownloadError;

/// Numeric VOD identifier (`title_no` on the platform)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VodId(String);

impl VodId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VodId {
    type Error = DownloadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        normalize(&value)
    }
}

impl From<VodId> for String {
    fn from(id: VodId) -> Self {
        id.0
    }
}

/// Extract the VOD identifier from a full URL, a scheme-less URL or a bare id.
///
/// `https://vod.sooplive.co.kr/player/123`, `vod.sooplive.co.kr/player/123/catch`
/// and `123` all yield `123`. Normalizing an already normalized id returns it unchanged.
pub fn normalize(input: &str) -> Result<VodId, DownloadError> {
    lazy_static::lazy_static! {
        static ref BARE_ID_RE: Regex = Regex::new(r"^\d+$").unwrap();
        static ref PLAYER_PATH_RE: Regex = Regex::new(
            r"^(?:[a-zA-Z][a-zA-Z0-9+.-]*://)?[^/?#\s]+(?:/[^?#\s]*)?/player/(\d+)(?:[/?#]\S*)?$"
        ).unwrap();
    }

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DownloadError::InvalidInput("empty input".to_string()));
    }

    if BARE_ID_RE.is_match(trimmed) {
        return Ok(VodId(trimmed.to_string()));
    }

    PLAYER_PATH_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| VodId(m.as_str().to_string()))
        .ok_or_else(|| DownloadError::InvalidInput(format!("no VOD id found in '{}'", trimmed)))
}

/// Canonical player URL for an id
pub fn player_url(id: &VodId) -> String {
    format!("https://vod.sooplive.co.kr/player/{}", id)
}

// Persistent settings (config.json)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::downloader::extractors::{soop, Credentials, ResolverConfig, SoopConfig};
use crate::downloader::DownloadError;

pub const APP_DIR: &str = "soop-vod";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// ffmpeg binary: a bare name is searched for, a path is used as is
    pub ffmpeg_path: String,
    /// `best` or a quality label such as `1080p`
    pub quality: String,
    pub output_dir: Option<PathBuf>,
    pub username: String,
    pub password: String,
    pub second_password: String,
    pub turbo: bool,
    pub jobs: usize,
    pub item_retries: u32,
    pub platform: PlatformConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            quality: "best".to_string(),
            output_dir: None,
            username: String::new(),
            password: String::new(),
            second_password: String::new(),
            turbo: false,
            jobs: 1,
            item_retries: 0,
            platform: PlatformConfig::default(),
        }
    }
}

/// Platform endpoints and HTTP behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub vod_api: String,
    pub login_api: String,
    pub logout_api: String,
    pub check_api: String,
    pub user_agent: String,
    pub referer: String,
    pub origin: String,
    /// SOCKS5/HTTP proxy URL for API requests
    pub proxy: Option<String>,
    pub request_timeout_secs: u64,
    /// Attempts per API call, including the first
    pub max_attempts: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            vod_api: soop::DEFAULT_VOD_API.to_string(),
            login_api: soop::DEFAULT_LOGIN_API.to_string(),
            logout_api: soop::DEFAULT_LOGOUT_API.to_string(),
            check_api: soop::DEFAULT_CHECK_API.to_string(),
            user_agent: soop::DEFAULT_USER_AGENT.to_string(),
            referer: soop::DEFAULT_REFERER.to_string(),
            origin: soop::DEFAULT_ORIGIN.to_string(),
            proxy: None,
            request_timeout_secs: 10,
            max_attempts: 3,
        }
    }
}

impl AppConfig {
    /// `<config dir>/soop-vod/config.json`
    pub fn default_path() -> Result<PathBuf, DownloadError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or_else(|| DownloadError::Config("cannot determine the user config directory".to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, DownloadError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DownloadError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| DownloadError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Load the file, writing defaults first when it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self, DownloadError> {
        if path.exists() {
            debug!(path = %path.display(), "loading config");
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        info!(path = %path.display(), "created config file with defaults");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), DownloadError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DownloadError::Config(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| DownloadError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, text)
            .map_err(|e| DownloadError::Config(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Configured directory, else the user's download directory, else `.`
    pub fn effective_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            second_password: Some(self.second_password.clone()).filter(|p| !p.is_empty()),
        }
    }

    pub fn soop_config(&self) -> SoopConfig {
        let p = &self.platform;
        SoopConfig {
            vod_api: p.vod_api.clone(),
            login_api: p.login_api.clone(),
            logout_api: p.logout_api.clone(),
            check_api: p.check_api.clone(),
            user_agent: p.user_agent.clone(),
            referer: p.referer.clone(),
            origin: p.origin.clone(),
            proxy: p.proxy.clone(),
            timeout: Duration::from_secs(p.request_timeout_secs.max(1)),
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::default().with_max_attempts(self.platform.max_attempts)
    }
}

// Command-line front end
//
// Settings resolve as flag > config file > built-in default, then the whole
// run is wired together: ffmpeg lookup, optional login, resolver, backend and
// batch driver.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::downloader::backends::FfmpegBackend;
use crate::downloader::batch::MAX_JOBS;
use crate::downloader::extractors::{Credentials, ManifestResolver, ManifestSource, SoopSource};
use crate::downloader::tools::ToolManager;
use crate::downloader::{read_batch_file, BatchDriver, BatchOptions, BatchReport, DownloadError, Downloader, QualityTarget};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Parser, Debug, Default)]
#[command(
    name = "soop-vod",
    author,
    version,
    about = "Download SOOP VODs as MP4 through ffmpeg",
    long_about = None
)]
pub struct Cli {
    /// VOD URLs or numeric VOD ids
    pub urls: Vec<String>,

    /// Quality to download: best, auto, 1080p, 720p, ...
    #[arg(short, long)]
    pub quality: Option<QualityTarget>,

    /// Path to the ffmpeg binary
    #[arg(short = 'f', long = "ffmpeg")]
    pub ffmpeg: Option<PathBuf>,

    /// Load settings from the config file, creating it if missing
    #[arg(short = 'c', long = "config")]
    pub use_config: bool,

    /// Config file location
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Store the effective ffmpeg path and quality in the config file
    #[arg(long)]
    pub save_config: bool,

    /// File with one URL or id per line
    #[arg(short, long)]
    pub batch: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Let ffmpeg use all CPU threads
    #[arg(short, long)]
    pub turbo: bool,

    /// VODs processed at the same time
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=MAX_JOBS as i64))]
    pub jobs: Option<u8>,

    /// Extra attempts for a VOD that failed with a network error
    #[arg(long)]
    pub retries: Option<u32>,

    /// Log in before downloading (needed for subscriber-only VODs)
    #[arg(long)]
    pub login: bool,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long, env = "SOOP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Second password for accounts that require it
    #[arg(long, env = "SOOP_SECOND_PASSWORD", hide_env_values = true)]
    pub second_password: Option<String>,

    /// Proxy for platform API requests, e.g. socks5h://127.0.0.1:1080
    #[arg(long)]
    pub proxy: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Exit status for a finished (or aborted) run
pub fn exit_code(result: &Result<BatchReport, DownloadError>) -> i32 {
    match result {
        Ok(report) if report.was_cancelled() => EXIT_CANCELLED,
        Ok(report) if report.all_succeeded() => EXIT_OK,
        Ok(_) => EXIT_FAILED,
        Err(DownloadError::Cancelled) => EXIT_CANCELLED,
        Err(DownloadError::Config(_) | DownloadError::InvalidInput(_)) => EXIT_USAGE,
        Err(_) => EXIT_FAILED,
    }
}

/// Fold config file and flags into one effective configuration
pub fn effective_config(cli: &Cli) -> Result<AppConfig, DownloadError> {
    let mut config = if cli.use_config {
        AppConfig::load_or_create(&config_path(cli)?)?
    } else {
        AppConfig::default()
    };

    if let Some(ffmpeg) = &cli.ffmpeg {
        config.ffmpeg_path = ffmpeg.display().to_string();
    }
    if let Some(quality) = &cli.quality {
        config.quality = quality.to_string();
    }
    if let Some(output) = &cli.output {
        config.output_dir = Some(output.clone());
    }
    if cli.turbo {
        config.turbo = true;
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs as usize;
    }
    if let Some(retries) = cli.retries {
        config.item_retries = retries;
    }
    if let Some(username) = &cli.username {
        config.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.password = password.clone();
    }
    if let Some(second) = &cli.second_password {
        config.second_password = second.clone();
    }
    if cli.proxy.is_some() {
        config.platform.proxy = cli.proxy.clone();
    }

    Ok(config)
}

fn config_path(cli: &Cli) -> Result<PathBuf, DownloadError> {
    match &cli.config_file {
        Some(path) => Ok(path.clone()),
        None => AppConfig::default_path(),
    }
}

/// Persist the last-used tool path and quality
fn save_preferences(cli: &Cli, effective: &AppConfig) -> Result<(), DownloadError> {
    let path = config_path(cli)?;
    let mut stored = if path.exists() {
        AppConfig::load(&path)?
    } else {
        AppConfig::default()
    };
    stored.ffmpeg_path = effective.ffmpeg_path.clone();
    stored.quality = effective.quality.clone();
    stored.save(&path)?;
    info!(path = %path.display(), "saved preferences");
    Ok(())
}

/// URLs from the command line first, then the batch file
pub async fn collect_inputs(urls: &[String], batch: Option<&Path>) -> Result<Vec<String>, DownloadError> {
    let mut inputs: Vec<String> = urls
        .iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    if let Some(batch) = batch {
        inputs.extend(read_batch_file(batch).await?);
    }
    Ok(inputs)
}

async fn login(source: &SoopSource, credentials: &Credentials) -> bool {
    match source.login(credentials).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "login failed; continuing without a session");
            false
        }
    }
}

pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<BatchReport, DownloadError> {
    let config = effective_config(&cli)?;
    let target: QualityTarget = config.quality.parse()?;

    let inputs = collect_inputs(&cli.urls, cli.batch.as_deref()).await?;
    if inputs.is_empty() {
        return Err(DownloadError::InvalidInput(
            "no VOD given; pass URLs or ids, or a batch file with --batch".to_string(),
        ));
    }

    if cli.save_config {
        save_preferences(&cli, &config)?;
    }

    let wanted = PathBuf::from(&config.ffmpeg_path);
    let tool = ToolManager::new().get_tool_info(Some(&wanted)).await;
    match &tool.version {
        Some(version) => info!(%version, "using ffmpeg"),
        None => warn!(path = %wanted.display(), "ffmpeg not found or not working"),
    }
    let tool_path = tool.path.clone().unwrap_or(wanted);

    let source = Arc::new(SoopSource::new(config.soop_config())?);

    let credentials = config.credentials();
    let want_login = cli.login || (cli.use_config && credentials.is_complete());
    let logged_in = if want_login {
        if !credentials.is_complete() {
            return Err(DownloadError::Config(
                "--login needs --username and --password (or SOOP_PASSWORD)".to_string(),
            ));
        }
        login(&source, &credentials).await
    } else {
        false
    };

    let resolver = ManifestResolver::new(source.clone() as Arc<dyn ManifestSource>)
        .with_config(config.resolver_config());
    let downloader = Downloader::new(Arc::new(FfmpegBackend::new()));
    let options = BatchOptions::new(config.effective_output_dir(), tool_path)
        .with_target(target)
        .with_turbo(config.turbo)
        .with_jobs(config.jobs)
        .with_item_retries(config.item_retries);

    let driver = BatchDriver::new(Arc::new(resolver), Arc::new(downloader), options);
    let report = driver.run(inputs, &cancel).await;

    if logged_in {
        source.logout().await;
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::Quality;
    use crate::downloader::{BatchEntry, DownloadResult, SkipReason};

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "soop-vod", "-q", "720p", "-j", "3", "-t", "-o", "/tmp/out", "123", "https://vod.sooplive.co.kr/player/456",
        ])
        .unwrap();
        assert_eq!(cli.quality, Some(QualityTarget::Exact(Quality::from_height(720).unwrap())));
        assert_eq!(cli.jobs, Some(3));
        assert!(cli.turbo);
        assert_eq!(cli.urls.len(), 2);
    }

    #[test]
    fn test_jobs_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["soop-vod", "-j", "9", "1"]).is_err());
        assert!(Cli::try_parse_from(["soop-vod", "-j", "0", "1"]).is_err());
    }

    #[test]
    fn test_bad_quality_rejected() {
        assert!(Cli::try_parse_from(["soop-vod", "-q", "ultra", "1"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"quality":"1080p","ffmpeg_path":"/opt/ffmpeg","jobs":2}"#).unwrap();

        let cli = Cli {
            use_config: true,
            config_file: Some(path),
            quality: Some(QualityTarget::Best),
            ..Default::default()
        };
        let config = effective_config(&cli).unwrap();
        assert_eq!(config.quality, "best");
        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg");
        assert_eq!(config.jobs, 2);
    }

    #[test]
    fn test_config_file_ignored_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cli = Cli {
            config_file: Some(path.clone()),
            ..Default::default()
        };
        assert_eq!(effective_config(&cli).unwrap(), AppConfig::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_preferences_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"username":"me"}"#).unwrap();

        let cli = Cli {
            config_file: Some(path.clone()),
            ..Default::default()
        };
        let mut effective = AppConfig::default();
        effective.quality = "720p".into();
        effective.ffmpeg_path = "/usr/bin/ffmpeg".into();
        save_preferences(&cli, &effective).unwrap();

        let stored = AppConfig::load(&path).unwrap();
        assert_eq!(stored.username, "me");
        assert_eq!(stored.quality, "720p");
        assert_eq!(stored.ffmpeg_path, "/usr/bin/ffmpeg");
    }

    #[tokio::test]
    async fn test_collect_inputs_order() {
        let dir = tempfile::tempdir().unwrap();
        let batch = dir.path().join("list.txt");
        std::fs::write(&batch, "\n 3 \n\n4\n").unwrap();

        let inputs = collect_inputs(&["1".into(), " ".into(), "2".into()], Some(&batch))
            .await
            .unwrap();
        assert_eq!(inputs, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_no_inputs_is_usage_error() {
        let result = run(Cli::default(), CancellationToken::new()).await;
        assert!(matches!(result, Err(DownloadError::InvalidInput(_))));
        assert_eq!(exit_code(&result), EXIT_USAGE);
    }

    #[test]
    fn test_exit_codes() {
        let ok = BatchEntry::new("1".into(), DownloadResult::Success(PathBuf::from("a.mp4")));
        let failed = BatchEntry::new("x".into(), DownloadResult::Failed(DownloadError::InvalidInput("x".into())));
        let cancelled = BatchEntry::new("2".into(), DownloadResult::Skipped(SkipReason::Cancelled));

        let report = |entries: Vec<BatchEntry>| -> Result<BatchReport, DownloadError> { Ok(BatchReport { entries }) };
        assert_eq!(exit_code(&report(vec![ok.clone()])), EXIT_OK);
        assert_eq!(exit_code(&report(vec![ok.clone(), failed])), EXIT_FAILED);
        assert_eq!(exit_code(&report(vec![ok, cancelled])), EXIT_CANCELLED);
        assert_eq!(exit_code(&Err(DownloadError::Io("disk".into()))), EXIT_FAILED);
    }
}

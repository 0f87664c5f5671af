// Downloader module - resolve, select and remux SOOP VODs

pub mod backends;
pub mod batch;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod vod_url;

pub use batch::{read_batch_file, BatchDriver, BatchEntry, BatchOptions, BatchReport};
pub use errors::DownloadError;
pub use format_selector::{Fallback, FormatSelector, Selection};
pub use models::{
    DownloadProgress, DownloadRequest, DownloadResult, Quality, QualityTarget, SkipReason, StreamSegment,
    StreamVariant, VodMetadata,
};
pub use orchestrator::{DownloadOutcome, Downloader};
pub use traits::{DownloaderBackend, ProgressEmitter, RemuxReport};
pub use vod_url::{normalize, VodId};

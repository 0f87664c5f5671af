// Downloader backends

pub mod ffmpeg;

pub use ffmpeg::{FfmpegBackend, EARLY_END_TOLERANCE_MS};

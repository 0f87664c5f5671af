pub mod cli;
pub mod config;
pub mod downloader;

pub use cli::{run, Cli};
pub use config::AppConfig;

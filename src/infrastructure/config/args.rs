use super::app_config::LogLevel;
use crate::domain::entities::SampleStrategy;
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "pixpool",
    version,
    about = "Decode image thumbnails concurrently through a pooled buffer cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image files to decode, reported in this order.
    #[arg(value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Thumbnail width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Thumbnail height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Sample size strategy.
    #[arg(long, value_enum)]
    pub strategy: Option<SampleStrategy>,

    /// Horizontal crop center in [0, 1].
    #[arg(long = "crop-x")]
    pub horizontal_center: Option<f32>,

    /// Vertical crop center in [0, 1].
    #[arg(long = "crop-y")]
    pub vertical_center: Option<f32>,

    /// Directory to write PNG thumbnails to.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Decodes allowed to run at once.
    #[arg(long)]
    pub max_concurrent_decodes: Option<usize>,

    /// Wait for pooled buffers instead of allocating.
    #[arg(long)]
    pub blocking: Option<bool>,

    /// Milliseconds a blocking decode waits for a pooled buffer.
    #[arg(long, value_name = "MS")]
    pub blocking_timeout_ms: Option<u64>,

    /// Decode into pooled buffers.
    #[arg(long)]
    pub reuse_buffers: Option<bool>,
}

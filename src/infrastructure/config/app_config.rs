//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::entities::{DecodeOptions, Dimensions, SampleStrategy};
use crate::infrastructure::cache::{
    CacheConfig, DEFAULT_NEGATIVE_CAPACITY, DEFAULT_NON_POOLED_CAPACITY, DEFAULT_TARGET_SIZE,
};

const APP_NAME: &str = "pixpool";
const APP_QUALIFIER: &str = "org";
const APP_ORGANIZATION: &str = "pixpool";

/// File name of the configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, loaded from `config.toml` and overridden by CLI.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Decode pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Thumbnail geometry.
    #[serde(default)]
    pub thumbnail: ThumbnailConfig,
}

/// Decode pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Unreferenced buffer bytes kept before scavenging starts.
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    /// Capacity of the cache for buffers that cannot be reused.
    #[serde(default = "default_non_pooled_capacity")]
    pub non_pooled_capacity: usize,

    /// Capacity of the negative cache.
    #[serde(default = "default_negative_capacity")]
    pub negative_capacity: usize,

    /// Decodes allowed to run at once.
    #[serde(default = "default_max_concurrent_decodes")]
    pub max_concurrent_decodes: usize,

    /// Make decodes wait for a pooled buffer instead of allocating.
    #[serde(default)]
    pub blocking: bool,

    /// Milliseconds a blocking decode waits for a pooled buffer before
    /// allocating its own.
    #[serde(default = "default_blocking_timeout_ms")]
    pub blocking_timeout_ms: u64,

    /// Decode into pooled buffers.
    #[serde(default = "default_true")]
    pub reuse_buffers: bool,
}

impl PipelineConfig {
    /// Cache sizing derived from this configuration.
    #[must_use]
    pub const fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            target_size: self.target_size,
            non_pooled_capacity: self.non_pooled_capacity,
            negative_capacity: self.negative_capacity,
        }
    }

    /// Bound on a blocking pool wait.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            non_pooled_capacity: default_non_pooled_capacity(),
            negative_capacity: default_negative_capacity(),
            max_concurrent_decodes: default_max_concurrent_decodes(),
            blocking: false,
            blocking_timeout_ms: default_blocking_timeout_ms(),
            reuse_buffers: true,
        }
    }
}

/// Thumbnail geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Destination width.
    #[serde(default = "default_thumbnail_edge")]
    pub width: u32,

    /// Destination height.
    #[serde(default = "default_thumbnail_edge")]
    pub height: u32,

    /// Horizontal crop center in `[0, 1]`.
    #[serde(default = "default_center")]
    pub horizontal_center: f32,

    /// Vertical crop center in `[0, 1]`.
    #[serde(default = "default_center")]
    pub vertical_center: f32,

    /// Sample size strategy.
    #[serde(default)]
    pub strategy: SampleStrategy,

    /// Directory decoded thumbnails are written to.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl ThumbnailConfig {
    /// Decode options for this geometry.
    #[must_use]
    pub fn decode_options(&self, reuse_buffers: bool) -> DecodeOptions {
        DecodeOptions::new(self.width, self.height)
            .with_crop_center(self.horizontal_center, self.vertical_center)
            .with_strategy(self.strategy)
            .with_reuse(reuse_buffers)
            .with_buffer_size(Dimensions::new(self.width, self.height))
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: default_thumbnail_edge(),
            height: default_thumbnail_edge(),
            horizontal_center: default_center(),
            vertical_center: default_center(),
            strategy: SampleStrategy::default(),
            output_dir: None,
        }
    }
}

const fn default_target_size() -> usize {
    DEFAULT_TARGET_SIZE
}

const fn default_non_pooled_capacity() -> usize {
    DEFAULT_NON_POOLED_CAPACITY
}

const fn default_negative_capacity() -> usize {
    DEFAULT_NEGATIVE_CAPACITY
}

const fn default_max_concurrent_decodes() -> usize {
    4
}

const fn default_blocking_timeout_ms() -> u64 {
    250
}

const fn default_thumbnail_edge() -> u32 {
    256
}

const fn default_center() -> f32 {
    0.5
}

const fn default_true() -> bool {
    true
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: CliArgs) {
        if let Some(config_path) = args.config {
            self.config = Some(config_path);
        }
        if let Some(log_path) = args.log_path {
            self.log_path = Some(log_path);
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(width) = args.width {
            self.thumbnail.width = width;
        }
        if let Some(height) = args.height {
            self.thumbnail.height = height;
        }
        if let Some(strategy) = args.strategy {
            self.thumbnail.strategy = strategy;
        }
        if let Some(center) = args.horizontal_center {
            self.thumbnail.horizontal_center = center;
        }
        if let Some(center) = args.vertical_center {
            self.thumbnail.vertical_center = center;
        }
        if let Some(output) = args.output {
            self.thumbnail.output_dir = Some(output);
        }
        if let Some(max) = args.max_concurrent_decodes {
            self.pipeline.max_concurrent_decodes = max;
        }
        if let Some(blocking) = args.blocking {
            self.pipeline.blocking = blocking;
        }
        if let Some(timeout) = args.blocking_timeout_ms {
            self.pipeline.blocking_timeout_ms = timeout;
        }
        if let Some(reuse) = args.reuse_buffers {
            self.pipeline.reuse_buffers = reuse;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Decode options for thumbnails, honoring the reuse switch.
    #[must_use]
    pub fn decode_options(&self) -> DecodeOptions {
        self.thumbnail.decode_options(self.pipeline.reuse_buffers)
    }
}

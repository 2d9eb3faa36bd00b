//! Per-request decode configuration.

use serde::{Deserialize, Serialize};

use super::geometry::Dimensions;

/// How the integer sample size is derived from the source/destination ratio.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SampleStrategy {
    /// `floor(ratio)`: decode a larger region, crop down afterwards.
    Truncate,
    /// `ceil(ratio)`: decode a smaller region, scale up afterwards.
    RoundUp,
    /// `2^round(log2(ratio))`.
    #[default]
    RoundNearest,
}

impl SampleStrategy {
    /// Computes the sample size for a source/destination ratio, never below 1.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn sample_size(self, ratio: f32) -> u32 {
        if !ratio.is_finite() || ratio <= 1.0 {
            return 1;
        }
        let sample = match self {
            Self::Truncate => ratio.floor(),
            Self::RoundUp => ratio.ceil(),
            Self::RoundNearest => 2f32.powf(ratio.log2().round()).round(),
        };
        (sample as u32).max(1)
    }
}

impl std::fmt::Display for SampleStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncate => write!(f, "truncate"),
            Self::RoundUp => write!(f, "round-up"),
            Self::RoundNearest => write!(f, "round-nearest"),
        }
    }
}

/// Options describing what a single decode should produce.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Destination size the decode approximates.
    pub dest: Dimensions,
    /// Horizontal crop center, 0.0 is left-most and 1.0 right-most.
    pub horizontal_center: f32,
    /// Vertical crop center, 0.0 is top-most and 1.0 bottom-most.
    pub vertical_center: f32,
    /// Sample size strategy.
    pub strategy: SampleStrategy,
    /// Decode into pooled buffers when possible.
    pub reuse_buffers: bool,
    /// Physical size of freshly allocated pooled buffers. When unset a fresh
    /// buffer is exactly as large as the first image decoded into it.
    pub buffer_size: Option<Dimensions>,
}

impl DecodeOptions {
    /// Creates options for a destination size with a centered crop.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dest: Dimensions::new(width, height),
            ..Self::default()
        }
    }

    /// Sets the crop center fractions, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_crop_center(mut self, horizontal: f32, vertical: f32) -> Self {
        self.horizontal_center = clamp_fraction(horizontal);
        self.vertical_center = clamp_fraction(vertical);
        self
    }

    /// Sets the sample size strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: SampleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enables or disables decoding into pooled buffers.
    #[must_use]
    pub const fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse_buffers = reuse;
        self
    }

    /// Sets the physical size of fresh pooled buffers.
    #[must_use]
    pub const fn with_buffer_size(mut self, size: Dimensions) -> Self {
        self.buffer_size = Some(size);
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            dest: Dimensions::new(256, 256),
            horizontal_center: 0.5,
            vertical_center: 0.5,
            strategy: SampleStrategy::default(),
            reuse_buffers: true,
            buffer_size: None,
        }
    }
}

fn clamp_fraction(value: f32) -> f32 {
    if value.is_nan() { 0.5 } else { value.clamp(0.0, 1.0) }
}

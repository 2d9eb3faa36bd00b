//! Plain geometry shared by the decode pipeline.

use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Creates new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the dimensions with width and height exchanged.
    #[must_use]
    pub const fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Returns true if `other` fits inside these dimensions.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        other.width <= self.width && other.height <= self.height
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
        }
    }

    /// Number of pixels covered.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Half-open pixel rectangle `[left, right) x [top, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge (inclusive).
    pub left: u32,
    /// Top edge (inclusive).
    pub top: u32,
    /// Right edge (exclusive).
    pub right: u32,
    /// Bottom edge (exclusive).
    pub bottom: u32,
}

impl Rect {
    /// Creates a rectangle from its edges.
    #[must_use]
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering all of `size`.
    #[must_use]
    pub const fn from_size(size: Dimensions) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Width of the rectangle.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height of the rectangle.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Size of the rectangle.
    #[must_use]
    pub const fn size(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// Returns true if the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Clockwise rotation needed to display the decoded pixels upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// No rotation.
    #[default]
    Normal,
    /// Rotate 90 degrees clockwise.
    Rotate90,
    /// Rotate 180 degrees.
    Rotate180,
    /// Rotate 270 degrees clockwise.
    Rotate270,
}

impl Orientation {
    /// Maps an EXIF orientation tag value to a rotation.
    ///
    /// Mirrored orientations (2, 4, 5, 7) are reported as `Normal`.
    #[must_use]
    pub const fn from_exif(value: u32) -> Self {
        match value {
            3 => Self::Rotate180,
            6 => Self::Rotate90,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }

    /// Rotation in degrees.
    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::Normal => 0,
            Self::Rotate90 => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 => 270,
        }
    }

    /// Returns true if displaying swaps width and height.
    #[must_use]
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270)
    }

    /// Converts raw (stored) dimensions to display dimensions.
    #[must_use]
    pub const fn to_display(self, raw: Dimensions) -> Dimensions {
        if self.swaps_axes() { raw.swapped() } else { raw }
    }

    /// Maps a rectangle given in display coordinates back onto the raw
    /// pixel grid of an image whose raw size is `raw`.
    #[must_use]
    pub const fn display_rect_to_raw(self, rect: Rect, raw: Dimensions) -> Rect {
        match self {
            Self::Normal => rect,
            Self::Rotate90 => Rect::new(
                rect.top,
                raw.height - rect.right,
                rect.bottom,
                raw.height - rect.left,
            ),
            Self::Rotate180 => Rect::new(
                raw.width - rect.right,
                raw.height - rect.bottom,
                raw.width - rect.left,
                raw.height - rect.top,
            ),
            Self::Rotate270 => Rect::new(
                raw.width - rect.bottom,
                rect.left,
                raw.width - rect.top,
                rect.right,
            ),
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

//! Reference-counted pixel buffers that can be recycled between decodes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use image::RgbaImage;
use parking_lot::{Mutex, MutexGuard};
use tracing::error;

use super::geometry::{Dimensions, Orientation};
use crate::domain::errors::PoolError;
use crate::domain::ports::Poolable;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

static NULL_BUFFER: LazyLock<Arc<PoolableBuffer>> = LazyLock::new(|| {
    Arc::new(PoolableBuffer::with_pixels(
        RgbaImage::new(0, 0),
        false,
    ))
});

#[derive(Debug, Clone, Copy)]
struct Layout {
    logical: Dimensions,
    orientation: Orientation,
}

/// One physical RGBA8 allocation shared by reference counting.
///
/// The logical size may be smaller than the physical allocation, so a single
/// allocation can serve decodes of differently sized crops. The count starts
/// at zero; a buffer at zero that is reusable may be handed back to the pool.
pub struct PoolableBuffer {
    pixels: Mutex<RgbaImage>,
    physical: Dimensions,
    layout: Mutex<Layout>,
    reusable: bool,
    ref_count: AtomicUsize,
}

impl PoolableBuffer {
    fn with_pixels(pixels: RgbaImage, reusable: bool) -> Self {
        let physical = Dimensions::new(pixels.width(), pixels.height());
        Self {
            pixels: Mutex::new(pixels),
            physical,
            layout: Mutex::new(Layout {
                logical: physical,
                orientation: Orientation::Normal,
            }),
            reusable,
            ref_count: AtomicUsize::new(0),
        }
    }

    /// Allocates a zeroed, reusable buffer of the given physical size.
    #[must_use]
    pub fn allocate(physical: Dimensions) -> Arc<Self> {
        Arc::new(Self::with_pixels(
            RgbaImage::new(physical.width, physical.height),
            true,
        ))
    }

    /// Wraps already decoded pixels. The logical size equals the pixel size.
    #[must_use]
    pub fn from_pixels(pixels: RgbaImage, reusable: bool) -> Arc<Self> {
        Arc::new(Self::with_pixels(pixels, reusable))
    }

    /// Returns the shared sentinel for a decode that produced nothing.
    #[must_use]
    pub fn null() -> Arc<Self> {
        NULL_BUFFER.clone()
    }

    /// Returns true if this is the empty-result sentinel.
    #[must_use]
    pub fn is_null(&self) -> bool {
        std::ptr::eq(self, Arc::as_ptr(&NULL_BUFFER))
    }

    /// Takes a reference. Always succeeds.
    pub fn acquire(&self) -> usize {
        if self.is_null() {
            return 0;
        }
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drops a reference and returns the remaining count.
    ///
    /// # Errors
    /// Returns [`PoolError::ReleaseUnreferenced`] if the count is already zero.
    pub fn release(&self) -> Result<usize, PoolError> {
        if self.is_null() {
            return Ok(0);
        }
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map(|previous| previous - 1)
            .map_err(|_| {
                error!(physical = %self.physical, "Released an unreferenced buffer");
                PoolError::ReleaseUnreferenced
            })
    }

    /// Current reference count.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Returns true if anyone holds a reference.
    #[must_use]
    pub fn is_referenced(&self) -> bool {
        self.ref_count() > 0
    }

    /// Returns true if the allocation may be reused by another decode.
    #[must_use]
    pub fn is_reusable(&self) -> bool {
        self.reusable && !self.is_null()
    }

    /// Size of the physical allocation.
    #[must_use]
    pub const fn physical_size(&self) -> Dimensions {
        self.physical
    }

    /// Size of the valid region inside the allocation.
    #[must_use]
    pub fn logical_size(&self) -> Dimensions {
        self.layout.lock().logical
    }

    /// Sets the valid region. Clamped to the physical size.
    pub fn set_logical_size(&self, size: Dimensions) {
        let clamped = Dimensions::new(
            size.width.min(self.physical.width),
            size.height.min(self.physical.height),
        );
        self.layout.lock().logical = clamped;
    }

    /// Rotation to apply when displaying the pixels.
    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.layout.lock().orientation
    }

    /// Sets the display rotation.
    pub fn set_orientation(&self, orientation: Orientation) {
        self.layout.lock().orientation = orientation;
    }

    /// Logical size after applying the orientation.
    #[must_use]
    pub fn display_size(&self) -> Dimensions {
        let layout = *self.layout.lock();
        layout.orientation.to_display(layout.logical)
    }

    /// Bytes held by the physical allocation.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn size_bytes(&self) -> usize {
        self.physical.area() as usize * BYTES_PER_PIXEL
    }

    /// Copies `src` into the top-left corner of the allocation and makes its
    /// size the logical size.
    ///
    /// # Errors
    /// Returns [`PoolError::BufferTooSmall`] if `src` does not fit.
    pub fn fill_from(&self, src: &RgbaImage) -> Result<(), PoolError> {
        let needed = Dimensions::new(src.width(), src.height());
        if !self.physical.contains(needed) {
            return Err(PoolError::BufferTooSmall {
                needed,
                physical: self.physical,
            });
        }
        {
            let mut pixels = self.pixels.lock();
            image::imageops::replace(&mut *pixels, src, 0, 0);
        }
        self.set_logical_size(needed);
        Ok(())
    }

    /// Locks the physical allocation.
    pub fn lock_pixels(&self) -> MutexGuard<'_, RgbaImage> {
        self.pixels.lock()
    }

    /// Copies out the logical region, unrotated.
    #[must_use]
    pub fn to_logical_image(&self) -> RgbaImage {
        let logical = self.logical_size();
        let pixels = self.pixels.lock();
        image::imageops::crop_imm(&*pixels, 0, 0, logical.width, logical.height).to_image()
    }

    /// Copies out the logical region rotated upright.
    #[must_use]
    pub fn to_display_image(&self) -> RgbaImage {
        let logical = self.to_logical_image();
        match self.orientation() {
            Orientation::Normal => logical,
            Orientation::Rotate90 => image::imageops::rotate90(&logical),
            Orientation::Rotate180 => image::imageops::rotate180(&logical),
            Orientation::Rotate270 => image::imageops::rotate270(&logical),
        }
    }
}

impl std::fmt::Debug for PoolableBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            return f.write_str("PoolableBuffer(null)");
        }
        let layout = *self.layout.lock();
        f.debug_struct("PoolableBuffer")
            .field("physical", &self.physical)
            .field("logical", &layout.logical)
            .field("orientation", &layout.orientation)
            .field("reusable", &self.reusable)
            .field("ref_count", &self.ref_count())
            .finish_non_exhaustive()
    }
}

impl Poolable for Arc<PoolableBuffer> {
    fn acquire(&self) -> usize {
        PoolableBuffer::acquire(self)
    }

    fn ref_count(&self) -> usize {
        PoolableBuffer::ref_count(self)
    }

    fn is_reusable(&self) -> bool {
        PoolableBuffer::is_reusable(self)
    }

    fn is_null(&self) -> bool {
        PoolableBuffer::is_null(self)
    }
}

//! # Blitter
//!
//! Contract between the session and the rasterizer. The drawing algorithms
//! live with the rasterizer; this module only fixes what they are handed and
//! when they may run.
//!
//! Every operation takes a [`BlitterGuard`], which the session hands out only
//! while it owns the blitter:
//!
//! ```ignore
//! if let Some(mut blitter) = session.blitter(&mut machine) {
//!     renderer.blit_fill(&mut blitter, plane.at(0, 0), 320, 256);
//!     // IMPORTANT: wait before reusing a buffer the blit touched
//!     blitter.wait_blit();
//! }
//! ```
//!
//! Buffers are planar, one bit per pixel per plane. Strides are in bytes and
//! word aligned. Coordinates are not checked by the blitter; callers that
//! are not sure should run [`PlaneRef::validate`] first.

use core::fmt;

use crate::custom::CustomChips;
use crate::sync;

/// A point inside a planar bitmap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneRef {
    /// Chip RAM address of the plane's first row.
    pub base: u32,
    /// Bytes per row.
    pub stride: u16,
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneError {
    /// Base address or stride not on a word boundary
    Unaligned,
    /// Rectangle leaves the plane
    OutOfBounds,
    Empty,
}

impl fmt::Display for PlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unaligned => write!(f, "plane base or stride not word aligned"),
            Self::OutOfBounds => write!(f, "rectangle outside plane"),
            Self::Empty => write!(f, "empty rectangle"),
        }
    }
}

impl PlaneRef {
    pub const fn new(base: u32, stride: u16, x: u16, y: u16) -> Self {
        Self { base, stride, x, y }
    }

    pub const fn at(self, x: u16, y: u16) -> Self {
        Self { x, y, ..self }
    }

    /// Width of the plane in pixels.
    #[inline(always)]
    pub fn width_px(&self) -> u32 {
        self.stride as u32 * 8
    }

    /// Address of the word holding pixel (`x`, `y`).
    #[inline(always)]
    pub fn word_address(&self) -> u32 {
        self.base + self.y as u32 * self.stride as u32 + (self.x as u32 / 16) * 2
    }

    /// Check a `width` x `height` rectangle at this point against a plane of
    /// `rows` rows.
    pub fn validate(&self, width: u16, height: u16, rows: u16) -> Result<(), PlaneError> {
        if self.base % 2 != 0 || self.stride % 2 != 0 {
            return Err(PlaneError::Unaligned);
        }
        if width == 0 || height == 0 {
            return Err(PlaneError::Empty);
        }
        if self.x as u32 + width as u32 > self.width_px() || self.y as u32 + height as u32 > rows as u32 {
            return Err(PlaneError::OutOfBounds);
        }
        Ok(())
    }
}

/// How a copy combines with what is already in the destination.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyMode {
    /// Overwrite the destination instead of OR-ing into it.
    pub replace_bg: bool,
    /// Run the copy bottom-right to top-left, for overlapping buffers.
    pub force_desc: bool,
}

/// Exclusive use of the blitter registers.
///
/// Handed out by [`HardwareSession::blitter`](crate::arbiter::HardwareSession::blitter)
/// while the session owns the blitter.
pub struct BlitterGuard<'a, C: CustomChips + ?Sized> {
    pub(crate) chips: &'a mut C,
}

impl<'a, C: CustomChips + ?Sized> BlitterGuard<'a, C> {
    /// Register access for the rasterizer.
    #[inline(always)]
    pub fn chips(&mut self) -> &mut C {
        &mut *self.chips
    }

    /// Wait for the current blit to complete.
    #[inline(always)]
    pub fn wait_blit(&mut self) {
        sync::wait_blit(self.chips);
    }
}

/// The drawing primitives the game consumes.
pub trait Rasterizer<C: CustomChips + ?Sized> {
    /// Copy a `width` x `height` rectangle from `src` to `dst`.
    fn blit_copy(
        &mut self,
        blitter: &mut BlitterGuard<'_, C>,
        src: PlaneRef,
        dst: PlaneRef,
        width: u16,
        height: u16,
        mode: CopyMode,
    );

    /// Set (or clear) the destination bits selected by `mask`.
    fn blit_rect(
        &mut self,
        blitter: &mut BlitterGuard<'_, C>,
        dst: PlaneRef,
        mask: PlaneRef,
        width: u16,
        height: u16,
        set_bits: bool,
    );

    /// One-pixel line in line mode, suitable for a later area fill.
    fn blit_line(&mut self, blitter: &mut BlitterGuard<'_, C>, dst: PlaneRef, x1: u16, y1: u16);

    /// Area fill between line edges, inside the rectangle at `dst`.
    fn blit_fill(&mut self, blitter: &mut BlitterGuard<'_, C>, dst: PlaneRef, width: u16, height: u16);

    /// Draw glyph `glyph` of the font at `font_base` into one text row.
    fn blit_char(
        &mut self,
        blitter: &mut BlitterGuard<'_, C>,
        font_base: u32,
        glyph: u16,
        dst_row: PlaneRef,
        color: u16,
        replace_bg: bool,
    );
}

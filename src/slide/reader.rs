//! Image source abstraction.
//!
//! An [`ImageSource`] opens slides by path; every call to
//! [`ImageSource::open`] returns an independent [`SourceHandle`] with its own
//! decoder state. Handles are stateful (selected level, decode caches) and
//! are never shared between threads: the pipeline opens one per worker.
//!
//! # Implementations
//!
//! - [`crate::slide::TiffSlideSource`] for Aperio SVS and pyramidal TIFF files
//!
//! Tests plug in synthetic sources through the same traits.

use serde::Serialize;
use std::path::Path;

use super::SlideProperties;
use crate::error::SourceError;
use crate::tile::TileBuffer;

// =============================================================================
// Level Information
// =============================================================================

/// Width, height and channel count of the selected level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Information about a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    /// Index of this level (0 = highest resolution)
    pub level: usize,

    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Width of each stored chunk (tile or strip) in pixels
    pub chunk_width: u32,

    /// Height of each stored chunk in pixels
    pub chunk_height: u32,

    /// Samples per pixel, `None` when the pixel layout is unsupported
    pub channels: Option<u8>,

    /// Downsample factor relative to level 0
    pub downsample: f64,
}

// =============================================================================
// Traits
// =============================================================================

/// Factory for independent slide handles.
pub trait ImageSource: Send + Sync + 'static {
    type Handle: SourceHandle;

    /// Open a new handle on the slide at `path`, with level 0 selected.
    fn open(&self, path: &Path) -> Result<Self::Handle, SourceError>;
}

/// An opened slide positioned at one resolution level.
///
/// All methods are blocking. Implementations need not be `Sync`.
pub trait SourceHandle {
    /// Number of resolution levels.
    fn level_count(&self) -> usize;

    /// Metadata for a level, `None` when out of range.
    fn level_info(&self, level: usize) -> Option<LevelInfo>;

    /// Select the level subsequent reads address.
    ///
    /// Fails with [`SourceError::InvalidLevel`] when out of range and with
    /// [`SourceError::Unsupported`] when the level's pixel layout cannot be
    /// read.
    fn select_level(&mut self, level: usize) -> Result<(), SourceError>;

    /// Index of the selected level.
    fn current_level(&self) -> usize;

    /// Dimensions of the selected level.
    fn dimensions(&self) -> Dimensions;

    /// Read a rectangle of the selected level.
    ///
    /// The rectangle must lie inside the level. The returned buffer has the
    /// level's channel count and exactly `width * height` pixels.
    fn read_region(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<TileBuffer, SourceError>;

    /// Vendor properties parsed from the slide, if any.
    fn properties(&self) -> Option<&SlideProperties> {
        None
    }
}

/// Reject rectangles that are empty or leave the level bounds.
pub fn check_region_bounds(
    dimensions: Dimensions,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<(), SourceError> {
    let fits = width > 0
        && height > 0
        && x as u64 + width as u64 <= dimensions.width as u64
        && y as u64 + height as u64 <= dimensions.height as u64;

    if fits {
        Ok(())
    } else {
        Err(SourceError::ReadFailed {
            x,
            y,
            width,
            height,
            message: format!(
                "region outside level bounds {}x{}",
                dimensions.width, dimensions.height
            ),
        })
    }
}

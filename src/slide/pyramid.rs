//! Pyramid level identification.
//!
//! WSI files contain multiple IFDs (Image File Directories), but not all are
//! pyramid levels. This module decides which IFDs form the resolution
//! pyramid and in which order.
//!
//! # Identification Heuristics
//!
//! Pyramid levels are identified by:
//! 1. Must be tiled (stripped images are only considered when the file has
//!    no tiled image at all)
//! 2. Dimensions decrease by consistent ratios (typically 2x or 4x)
//! 3. Largest image is level 0
//!
//! Non-pyramid images are identified by:
//! - Label: Small, often square-ish, may not be tiled
//! - Macro: Medium-sized, different aspect ratio than pyramid
//! - Thumbnail: Very small, may lack tile structure
//!
//! When nothing qualifies, the first IFD alone becomes level 0 so that plain
//! single-image TIFFs remain usable.

/// Maximum number of IFDs to inspect (safety limit)
pub const MAX_IFDS: usize = 100;

/// Minimum dimension to be considered a pyramid level (pixels)
/// Images smaller than this are likely thumbnails
const MIN_PYRAMID_DIMENSION: u32 = 256;

/// Maximum size for a label image (pixels)
const MAX_LABEL_DIMENSION: u32 = 2000;

/// Layout of one IFD as reported by the container decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IfdLayout {
    /// Index of the IFD in the file's IFD chain
    pub ifd_index: usize,
    pub width: u32,
    pub height: u32,
    pub chunk_width: u32,
    pub chunk_height: u32,
    /// Whether the image is organized in tiles (vs strips)
    pub tiled: bool,
    /// Samples per pixel, `None` for unsupported layouts
    pub channels: Option<u8>,
}

/// A single level in the image pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidLevel {
    /// Index of this level in the pyramid (0 = highest resolution)
    pub level_index: usize,

    /// Layout of the backing IFD
    pub layout: IfdLayout,

    /// Downsample factor relative to level 0 (1.0 for level 0)
    pub downsample: f64,
}

impl PyramidLevel {
    pub fn chunks_across(&self) -> u32 {
        self.layout.width.div_ceil(self.layout.chunk_width.max(1))
    }
}

/// Build the ordered pyramid from the IFDs of a file.
pub fn build_pyramid(ifds: &[IfdLayout]) -> Vec<PyramidLevel> {
    let any_tiled = ifds.iter().any(|ifd| ifd.tiled);

    let mut candidates: Vec<IfdLayout> = ifds
        .iter()
        .filter(|ifd| ifd.tiled || !any_tiled)
        .filter(|ifd| is_pyramid_candidate(ifd))
        .copied()
        .collect();

    // Sort candidates by area (largest first = level 0)
    candidates.sort_by(|a, b| {
        let area_a = (a.width as u64) * (a.height as u64);
        let area_b = (b.width as u64) * (b.height as u64);
        area_b.cmp(&area_a)
    });

    let levels = filter_pyramid_levels(candidates);
    if !levels.is_empty() {
        return levels;
    }

    ifds.first()
        .map(|&layout| {
            vec![PyramidLevel {
                level_index: 0,
                layout,
                downsample: 1.0,
            }]
        })
        .unwrap_or_default()
}

/// Check if an IFD looks like a pyramid candidate (vs label/macro).
fn is_pyramid_candidate(ifd: &IfdLayout) -> bool {
    // Must have minimum dimensions
    if ifd.width < MIN_PYRAMID_DIMENSION || ifd.height < MIN_PYRAMID_DIMENSION {
        return false;
    }

    if ifd.chunk_width == 0 || ifd.chunk_height == 0 {
        return false;
    }

    // Exclude likely label images (small and square-ish)
    if ifd.width <= MAX_LABEL_DIMENSION && ifd.height <= MAX_LABEL_DIMENSION {
        let aspect_ratio = ifd.width as f64 / ifd.height as f64;
        if aspect_ratio > 0.5 && aspect_ratio < 2.0 && ifd.width <= 1000 && ifd.height <= 1000 {
            return false;
        }
    }

    true
}

/// Keep only candidates that form a consistent pyramid.
fn filter_pyramid_levels(candidates: Vec<IfdLayout>) -> Vec<PyramidLevel> {
    let Some(base) = candidates.first() else {
        return Vec::new();
    };

    // The largest image is always level 0
    let base_width = base.width as f64;
    let base_height = base.height as f64;

    let mut levels: Vec<PyramidLevel> = Vec::new();

    for (idx, layout) in candidates.into_iter().enumerate() {
        let downsample_x = base_width / layout.width as f64;
        let downsample_y = base_height / layout.height as f64;
        let downsample = (downsample_x + downsample_y) / 2.0;

        if is_valid_downsample(downsample, idx) {
            levels.push(PyramidLevel {
                level_index: levels.len(),
                layout,
                downsample,
            });
        }
    }

    levels
}

/// Check if a downsample factor is valid for a pyramid level.
fn is_valid_downsample(downsample: f64, level_idx: usize) -> bool {
    if level_idx == 0 {
        return (downsample - 1.0).abs() < 0.1;
    }

    // Must be close to a power of two, at least 2x
    let rounded = downsample.log2().round();
    if rounded < 1.0 {
        return false;
    }

    let ratio = downsample / 2.0_f64.powf(rounded);
    ratio > 0.8 && ratio < 1.2
}

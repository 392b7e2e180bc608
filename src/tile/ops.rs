//! Pixel primitives used by the extraction path.
//!
//! Thin wrappers over the `image` crate: colorspace conversion, channel
//! split, thresholded counting, high-quality resampling and autocontrast.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};

use super::TileBuffer;

/// Default downsample target edge length.
pub const DEFAULT_TARGET_SIZE: u32 = 224;

/// Convert to single-channel luminance with ITU-R 601-2 weights.
///
/// Gray tiles are returned as-is; alpha is ignored.
pub fn to_grayscale(tile: &TileBuffer) -> GrayImage {
    match tile.as_image() {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(gray_alpha) => {
            GrayImage::from_fn(gray_alpha.width(), gray_alpha.height(), |x, y| {
                Luma([gray_alpha.get_pixel(x, y)[0]])
            })
        }
        other => {
            let rgb = other.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000;
                Luma([luma as u8])
            })
        }
    }
}

/// Split into R, G and B planes. Gray tiles yield three identical planes.
pub fn split_channels(tile: &TileBuffer) -> [GrayImage; 3] {
    let rgb = tile.as_image().to_rgb8();
    let (width, height) = rgb.dimensions();
    let plane = |channel: usize| {
        GrayImage::from_fn(width, height, |x, y| Luma([rgb.get_pixel(x, y)[channel]]))
    };
    [plane(0), plane(1), plane(2)]
}

/// Count pixels strictly above `threshold`.
pub fn count_above_threshold(plane: &GrayImage, threshold: u8) -> u64 {
    plane.as_raw().iter().filter(|&&v| v > threshold).count() as u64
}

/// Resize to exactly `width` × `height` with a Lanczos3 filter.
pub fn resize(tile: &TileBuffer, width: u32, height: u32) -> TileBuffer {
    TileBuffer::from_image(tile.as_image().resize_exact(width, height, FilterType::Lanczos3))
}

/// Resize to `target` × `target` when either dimension exceeds it.
///
/// Tiles already at or under the target pass through unchanged.
pub fn downsample_to_target(tile: TileBuffer, target: u32) -> TileBuffer {
    if tile.width() > target || tile.height() > target {
        resize(&tile, target, target)
    } else {
        tile
    }
}

/// Stretch each color channel so its minimum maps to 0 and maximum to 255.
///
/// Alpha is left untouched; flat channels are left as they are.
pub fn autocontrast(tile: TileBuffer) -> TileBuffer {
    let channels = tile.channels() as usize;
    let color_channels = match channels {
        2 | 4 => channels - 1,
        _ => channels,
    };

    let mut lo = [u8::MAX; 4];
    let mut hi = [u8::MIN; 4];
    for pixel in tile.as_bytes().chunks_exact(channels) {
        for c in 0..color_channels {
            lo[c] = lo[c].min(pixel[c]);
            hi[c] = hi[c].max(pixel[c]);
        }
    }

    let mut data = tile.as_bytes().to_vec();
    for pixel in data.chunks_exact_mut(channels) {
        for c in 0..color_channels {
            let span = hi[c] as u32 - lo[c] as u32;
            if span == 0 {
                continue;
            }
            pixel[c] = ((pixel[c] - lo[c]) as u32 * 255 / span) as u8;
        }
    }

    let (width, height) = (tile.width(), tile.height());
    TileBuffer::from_raw(width, height, channels as u8, data).unwrap_or(tile)
}

//! Tile encoder.
//!
//! Encodes a [`TileBuffer`] in memory with the configured codec. The writer
//! then persists the bytes; encoding never touches the filesystem.
//!
//! # Formats
//!
//! - **TIFF** (default): uncompressed, lossless.
//! - **PNG**: lossless, smaller on disk.
//! - **JPEG**: lossy, quality configurable; alpha is dropped.

use bytes::Bytes;
use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::TileBuffer;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Output Format
// =============================================================================

/// Image codec used for persisted tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[value(name = "tif", alias = "tiff")]
    Tiff,
    Png,
    #[value(name = "jpg", alias = "jpeg")]
    Jpeg,
}

impl OutputFormat {
    /// File extension, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            OutputFormat::Tiff => "tif",
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    const fn image_format(self) -> ImageFormat {
        match self {
            OutputFormat::Tiff => ImageFormat::Tiff,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Stateless tile encoder bound to one output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileEncoder {
    format: OutputFormat,
    quality: u8,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self::new(OutputFormat::default())
    }
}

impl TileEncoder {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set the JPEG quality. Ignored for lossless formats.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = clamp_quality(quality);
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Encode a tile to bytes.
    pub fn encode(&self, tile: &TileBuffer) -> Result<Bytes, image::ImageError> {
        let mut output = Vec::new();

        match self.format {
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel
                let image = match tile.as_image() {
                    DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(gray.clone()),
                    other => DynamicImage::ImageRgb8(other.to_rgb8()),
                };
                let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);
                encoder.encode_image(&image)?;
            }
            format => {
                tile.as_image()
                    .write_to(&mut Cursor::new(&mut output), format.image_format())?;
            }
        }

        Ok(Bytes::from(output))
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================

//! Owned pixel data for one tile.

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};

use crate::error::SourceError;

/// Pixel data for a single tile, 8 bits per sample, interleaved.
///
/// The channel count is inherited from the source level (1 = gray,
/// 2 = gray + alpha, 3 = RGB, 4 = RGBA). A buffer is owned by the worker
/// that read it until it is moved into a write task.
#[derive(Debug, Clone)]
pub struct TileBuffer {
    image: DynamicImage,
}

impl TileBuffer {
    /// Wrap a raw interleaved buffer.
    ///
    /// Fails when the byte length does not match `width * height * channels`
    /// or the channel count is not 1 to 4.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, SourceError> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(SourceError::ReadFailed {
                x: 0,
                y: 0,
                width,
                height,
                message: format!(
                    "buffer size {} does not match expected size {}",
                    data.len(),
                    expected
                ),
            });
        }

        let image = match channels {
            1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            2 => GrayAlphaImage::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
            3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
            other => {
                return Err(SourceError::Unsupported(format!(
                    "{} samples per pixel",
                    other
                )))
            }
        };

        image
            .map(|image| Self { image })
            .ok_or_else(|| SourceError::Unsupported("buffer layout rejected".to_string()))
    }

    /// Wrap an already decoded image, converting to 8 bits per sample.
    pub fn from_image(image: DynamicImage) -> Self {
        let image = match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_) => image,
            other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    /// Number of pixels (not samples).
    pub fn pixel_count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Raw interleaved samples.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

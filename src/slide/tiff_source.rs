//! TIFF-backed image source for Aperio SVS and pyramidal TIFF slides.
//!
//! Container decoding (IFD walking, LZW/Deflate chunk decompression) is
//! delegated to the `tiff` crate. JPEG-compressed levels are decoded through
//! [`super::jpeg`] so that YCbCr streams come back as RGB. This module adds
//! the slide view on top: pyramid level selection, region reads that stitch
//! the chunks intersecting a rectangle, and a per-handle LRU of decoded
//! chunks.
//!
//! # Region reads
//!
//! ```text
//!        chunk (0,0)      chunk (1,0)
//!     ┌───────────────┬───────────────┐
//!     │        ┌──────┼─────┐         │
//!     │        │ requested  │         │
//!     ├────────┼──────┼─────┼─────────┤
//!     │        └──────┼─────┘         │
//!     │  chunk (0,1)  │  chunk (1,1)  │
//!     └───────────────┴───────────────┘
//! ```
//!
//! Each intersecting chunk is decoded once (or taken from the cache) and the
//! overlapping rows are copied into the output buffer.

use lru::LruCache;
use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use super::jpeg::{DecodedChunk, JpegChunks, JPEG_COMPRESSION};
use super::pyramid::{build_pyramid, IfdLayout, PyramidLevel, MAX_IFDS};
use super::reader::{check_region_bounds, Dimensions, ImageSource, LevelInfo, SourceHandle};
use super::SlideProperties;
use crate::error::SourceError;
use crate::tile::TileBuffer;

/// Default number of decoded chunks kept per handle.
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 16;

// =============================================================================
// Source
// =============================================================================

/// Opens SVS / TIFF slides from the local filesystem.
#[derive(Debug, Clone)]
pub struct TiffSlideSource {
    chunk_cache_capacity: NonZeroUsize,
}

impl Default for TiffSlideSource {
    fn default() -> Self {
        Self::with_chunk_cache(DEFAULT_CHUNK_CACHE_CAPACITY)
    }
}

impl TiffSlideSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many decoded chunks each handle keeps. Zero is treated as one.
    pub fn with_chunk_cache(capacity: usize) -> Self {
        Self {
            chunk_cache_capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl ImageSource for TiffSlideSource {
    type Handle = TiffSlideHandle;

    fn open(&self, path: &Path) -> Result<Self::Handle, SourceError> {
        TiffSlideHandle::open(path, self.chunk_cache_capacity)
    }
}

// =============================================================================
// Handle
// =============================================================================

/// One open slide with its own decoder.
pub struct TiffSlideHandle {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    /// Second descriptor for raw JPEG chunk reads
    raw: File,
    /// Set while the current level is JPEG-compressed
    jpeg: Option<JpegChunks>,
    levels: Vec<PyramidLevel>,
    current: usize,
    chunks: LruCache<u32, Arc<DecodedChunk>>,
    properties: SlideProperties,
}

impl std::fmt::Debug for TiffSlideHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffSlideHandle")
            .field("path", &self.path)
            .field("levels", &self.levels.len())
            .field("current", &self.current)
            .finish()
    }
}

impl TiffSlideHandle {
    fn open(path: &Path, cache_capacity: NonZeroUsize) -> Result<Self, SourceError> {
        let cannot_open = |message: String| SourceError::CannotOpen {
            path: path.to_path_buf(),
            message,
        };

        let file = File::open(path).map_err(|e| cannot_open(e.to_string()))?;
        let raw = File::open(path).map_err(|e| cannot_open(e.to_string()))?;
        let mut decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| cannot_open(e.to_string()))?;

        let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();
        let properties = description
            .as_deref()
            .map(SlideProperties::parse)
            .unwrap_or_default();

        let mut ifds = Vec::new();
        for ifd_index in 0..MAX_IFDS {
            ifds.push(read_ifd_layout(&mut decoder, ifd_index).map_err(cannot_open)?);
            if !decoder.more_images() {
                break;
            }
            decoder
                .next_image()
                .map_err(|e| cannot_open(e.to_string()))?;
        }

        let levels = build_pyramid(&ifds);
        if levels.is_empty() {
            return Err(cannot_open("no readable image in file".to_string()));
        }

        debug!(
            path = %path.display(),
            ifds = ifds.len(),
            levels = levels.len(),
            format = properties.format.name(),
            "opened slide"
        );

        let mut handle = Self {
            path: path.to_path_buf(),
            decoder,
            raw,
            jpeg: None,
            levels,
            current: 0,
            chunks: LruCache::new(cache_capacity),
            properties,
        };
        handle.seek_level(0).map_err(|e| cannot_open(e.to_string()))?;
        Ok(handle)
    }

    fn seek_level(&mut self, level: usize) -> Result<(), SourceError> {
        let pyramid_level = self.levels.get(level).ok_or(SourceError::InvalidLevel {
            level,
            count: self.levels.len(),
        })?;
        let ifd_index = pyramid_level.layout.ifd_index;

        self.decoder
            .seek_to_image(ifd_index)
            .map_err(|e| SourceError::CannotOpen {
                path: self.path.clone(),
                message: format!("cannot seek to IFD {}: {}", ifd_index, e),
            })?;
        self.jpeg = read_jpeg_chunks(&mut self.decoder).map_err(|message| {
            SourceError::CannotOpen {
                path: self.path.clone(),
                message: format!("IFD {}: {}", ifd_index, message),
            }
        })?;
        self.current = level;
        self.chunks.clear();
        Ok(())
    }

    fn level(&self) -> &PyramidLevel {
        &self.levels[self.current]
    }

    /// Decode a chunk of the current level, going through the cache.
    fn chunk(&mut self, index: u32, channels: u8) -> Result<Arc<DecodedChunk>, String> {
        if let Some(chunk) = self.chunks.get(&index) {
            return Ok(Arc::clone(chunk));
        }

        let decoded = match &self.jpeg {
            Some(jpeg) => jpeg.decode(&mut self.raw, index, channels)?,
            None => {
                let (width, height) = self.decoder.chunk_data_dimensions(index);
                let data = match self.decoder.read_chunk(index).map_err(|e| e.to_string())? {
                    DecodingResult::U8(data) => data,
                    _ => return Err("only 8-bit samples are supported".to_string()),
                };
                DecodedChunk {
                    width,
                    height,
                    data,
                }
            }
        };

        let chunk = Arc::new(decoded);
        self.chunks.put(index, Arc::clone(&chunk));
        Ok(chunk)
    }

    fn copy_region(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<Vec<u8>, String> {
        let level = *self.level();
        let (chunk_w, chunk_h) = (level.layout.chunk_width, level.layout.chunk_height);
        let across = level.chunks_across();
        let samples = channels as usize;

        let mut out = vec![0u8; width as usize * height as usize * samples];
        let (x_end, y_end) = (x + width, y + height);

        for cy in (y / chunk_h)..=((y_end - 1) / chunk_h) {
            for cx in (x / chunk_w)..=((x_end - 1) / chunk_w) {
                let chunk = self.chunk(cy * across + cx, channels)?;
                if chunk.data.len() != chunk.width as usize * chunk.height as usize * samples {
                    return Err(format!(
                        "chunk ({}, {}) has {} bytes, expected {}x{}x{}",
                        cx,
                        cy,
                        chunk.data.len(),
                        chunk.width,
                        chunk.height,
                        channels
                    ));
                }

                let (origin_x, origin_y) = (cx * chunk_w, cy * chunk_h);
                let ox0 = x.max(origin_x);
                let ox1 = x_end.min(origin_x + chunk.width);
                let oy0 = y.max(origin_y);
                let oy1 = y_end.min(origin_y + chunk.height);
                if ox0 >= ox1 || oy0 >= oy1 {
                    continue;
                }

                let row_len = (ox1 - ox0) as usize * samples;
                for row in oy0..oy1 {
                    let src = ((row - origin_y) as usize * chunk.width as usize
                        + (ox0 - origin_x) as usize)
                        * samples;
                    let dst = ((row - y) as usize * width as usize + (ox0 - x) as usize)
                        * samples;
                    out[dst..dst + row_len].copy_from_slice(&chunk.data[src..src + row_len]);
                }
            }
        }

        Ok(out)
    }
}

impl SourceHandle for TiffSlideHandle {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.levels.get(level).map(|l| LevelInfo {
            level,
            width: l.layout.width,
            height: l.layout.height,
            chunk_width: l.layout.chunk_width,
            chunk_height: l.layout.chunk_height,
            channels: l.layout.channels,
            downsample: l.downsample,
        })
    }

    fn select_level(&mut self, level: usize) -> Result<(), SourceError> {
        let pyramid_level = self.levels.get(level).ok_or(SourceError::InvalidLevel {
            level,
            count: self.levels.len(),
        })?;
        if pyramid_level.layout.channels.is_none() {
            return Err(SourceError::Unsupported(format!(
                "level {} uses a pixel layout other than 8-bit gray/RGB(A)",
                level
            )));
        }
        if level == self.current {
            return Ok(());
        }
        self.seek_level(level)
    }

    fn current_level(&self) -> usize {
        self.current
    }

    fn dimensions(&self) -> Dimensions {
        let layout = self.level().layout;
        Dimensions {
            width: layout.width,
            height: layout.height,
            channels: layout.channels.unwrap_or(0),
        }
    }

    fn read_region(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<TileBuffer, SourceError> {
        let dimensions = self.dimensions();
        check_region_bounds(dimensions, x, y, width, height)?;

        let read_failed = |message: String| SourceError::ReadFailed {
            x,
            y,
            width,
            height,
            message,
        };

        let channels = match dimensions.channels {
            0 => return Err(read_failed("unsupported pixel layout".to_string())),
            c => c,
        };

        let data = self
            .copy_region(x, y, width, height, channels)
            .map_err(read_failed)?;

        TileBuffer::from_raw(width, height, channels, data).map_err(|e| read_failed(e.to_string()))
    }

    fn properties(&self) -> Option<&SlideProperties> {
        Some(&self.properties)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn read_ifd_layout(
    decoder: &mut Decoder<BufReader<File>>,
    ifd_index: usize,
) -> Result<IfdLayout, String> {
    let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;
    let channels = if compression(decoder) == JPEG_COMPRESSION {
        decoder.colortype().ok().and_then(jpeg_channels_for)
    } else {
        decoder.colortype().ok().and_then(channels_for)
    };
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();

    Ok(IfdLayout {
        ifd_index,
        width,
        height,
        chunk_width,
        chunk_height,
        tiled: matches!(decoder.get_chunk_type(), ChunkType::Tile),
        channels,
    })
}

fn compression(decoder: &mut Decoder<BufReader<File>>) -> u32 {
    decoder.get_tag_u32(Tag::Compression).unwrap_or(1)
}

/// Chunk table of the current IFD when it is JPEG-compressed.
fn read_jpeg_chunks(
    decoder: &mut Decoder<BufReader<File>>,
) -> Result<Option<JpegChunks>, String> {
    if compression(decoder) != JPEG_COMPRESSION {
        return Ok(None);
    }

    let (offsets_tag, counts_tag) = match decoder.get_chunk_type() {
        ChunkType::Tile => (Tag::TileOffsets, Tag::TileByteCounts),
        ChunkType::Strip => (Tag::StripOffsets, Tag::StripByteCounts),
    };
    let offsets = decoder
        .get_tag_u64_vec(offsets_tag)
        .map_err(|e| e.to_string())?;
    let byte_counts = decoder
        .get_tag_u64_vec(counts_tag)
        .map_err(|e| e.to_string())?;
    let tables = decoder.get_tag_u8_vec(Tag::JPEGTables).ok();

    Ok(Some(JpegChunks::new(offsets, byte_counts, tables)))
}

/// Samples per pixel for the 8-bit layouts the pipeline handles.
///
/// Uncompressed YCbCr is left out: its samples would reach the classifier
/// as if they were RGB.
fn channels_for(color: ColorType) -> Option<u8> {
    match color {
        ColorType::Gray(8) => Some(1),
        ColorType::GrayA(8) => Some(2),
        ColorType::RGB(8) => Some(3),
        ColorType::RGBA(8) => Some(4),
        _ => None,
    }
}

/// JPEG chunks decode to gray or RGB whatever the photometric tag says.
fn jpeg_channels_for(color: ColorType) -> Option<u8> {
    match color {
        ColorType::Gray(8) => Some(1),
        ColorType::RGB(8) | ColorType::YCbCr(8) => Some(3),
        _ => None,
    }
}

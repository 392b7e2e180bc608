//! JPEG-compressed chunk decoding.
//!
//! Slides compress their tiles as JPEG streams whose color space is declared
//! by the stream itself (JFIF YCbCr, or Adobe-marked RGB), not by the TIFF
//! photometric tag. The `tiff` decoder hands JPEG samples back untransformed,
//! so JPEG levels are read here instead: the raw chunk bytes are pulled from
//! the file, completed with the level's `JPEGTables` and decoded to RGB (or
//! gray) through `image`.
//!
//! # Abbreviated streams
//!
//! Aperio tiles omit the quantization and Huffman tables, which are stored
//! once per IFD. Merging strips the EOI from the tables and the SOI from the
//! tile:
//!
//! ```text
//! tables: SOI DQT DHT EOI      tile: SOI SOF SOS ... EOI
//! merged: SOI DQT DHT SOF SOS ... EOI
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use image::ImageFormat;

/// TIFF Compression value for JPEG ("new-style").
pub const JPEG_COMPRESSION: u32 = 7;

/// Start Of Image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Largest chunk accepted, as a guard against corrupt byte counts.
const MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

/// Merge `JPEGTables` with an abbreviated tile stream.
///
/// Empty tables return the tile unchanged.
pub fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Vec<u8> {
    if tables.is_empty() || tile.is_empty() {
        return tile.to_vec();
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let tile_start = if tile.starts_with(&SOI) { 2 } else { 0 };

    let mut merged = Vec::with_capacity(tables_end + tile.len() - tile_start);
    merged.extend_from_slice(&tables[..tables_end]);
    merged.extend_from_slice(&tile[tile_start..]);
    merged
}

/// Chunk locations and shared tables of one JPEG-compressed level.
#[derive(Debug, Clone)]
pub struct JpegChunks {
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    tables: Option<Vec<u8>>,
}

/// A chunk decoded to interleaved 8-bit samples.
#[derive(Debug)]
pub struct DecodedChunk {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl JpegChunks {
    pub fn new(offsets: Vec<u64>, byte_counts: Vec<u64>, tables: Option<Vec<u8>>) -> Self {
        Self {
            offsets,
            byte_counts,
            tables: tables.filter(|t| t.len() >= 4),
        }
    }

    fn len(&self) -> usize {
        self.offsets.len().min(self.byte_counts.len())
    }

    /// Read the compressed bytes of chunk `index`.
    fn read_raw(&self, file: &mut File, index: u32) -> Result<Vec<u8>, String> {
        let i = index as usize;
        if i >= self.len() {
            return Err(format!("chunk {} out of range ({} chunks)", index, self.len()));
        }

        let (offset, length) = (self.offsets[i], self.byte_counts[i]);
        if length == 0 || length > MAX_CHUNK_BYTES {
            return Err(format!("chunk {} has invalid byte count {}", index, length));
        }

        let mut data = vec![0u8; length as usize];
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut data))
            .map_err(|e| format!("cannot read chunk {}: {}", index, e))?;
        Ok(data)
    }

    /// Decode chunk `index` to `channels` samples per pixel (1 or 3).
    pub fn decode(
        &self,
        file: &mut File,
        index: u32,
        channels: u8,
    ) -> Result<DecodedChunk, String> {
        let raw = self.read_raw(file, index)?;
        let stream = match &self.tables {
            Some(tables) => merge_jpeg_tables(tables, &raw),
            None => raw,
        };

        let image = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
            .map_err(|e| format!("cannot decode JPEG chunk {}: {}", index, e))?;
        let (width, height) = (image.width(), image.height());
        let data = match channels {
            1 => image.into_luma8().into_raw(),
            3 => image.into_rgb8().into_raw(),
            other => return Err(format!("{} channel JPEG chunks are not supported", other)),
        };

        Ok(DecodedChunk {
            width,
            height,
            data,
        })
    }
}

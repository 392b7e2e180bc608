//! Tile layer.
//!
//! Everything that operates on a single tile or on the tile grid, with no
//! knowledge of threads or queues:
//!
//! ```text
//! ┌───────────────┐   ┌──────────────┐   ┌────────────────┐   ┌──────────────┐
//! │  TileGrid     │──▶│  TileBuffer  │──▶│ TileClassifier │──▶│  TileSink    │
//! │ (coordinates) │   │ (ops: resize,│   │ (background /  │   │ (TileEncoder │
//! │               │   │  normalize)  │   │  stain)        │   │  + tokio fs) │
//! └───────────────┘   └──────────────┘   └────────────────┘   └──────────────┘
//! ```
//!
//! # Components
//!
//! - [`RegionOfInterest`], [`TileCoordinate`], [`TileGrid`]: pure geometry
//! - [`TileBuffer`]: owned 8-bit pixel data of one tile
//! - [`ops`]: grayscale, channel split, threshold counting, resampling
//! - [`TileClassifier`]: drop heuristics
//! - [`TileEncoder`] / [`OutputFormat`]: in-memory encoding
//! - [`TileSink`] / [`FileSink`]: persistence

mod buffer;
mod classifier;
mod encoder;
mod geometry;
pub mod ops;
mod sink;

pub use buffer::TileBuffer;
pub use classifier::{
    is_mostly_background, is_mostly_stain_color, is_tissue_with_variation, BackgroundParams,
    StainParams, TileClassifier, TileVerdict, TissueParams, DEFAULT_BACKGROUND_RATIO,
    DEFAULT_BACKGROUND_THRESHOLD, DEFAULT_STAIN_MARGIN, DEFAULT_STAIN_RATIO,
    DEFAULT_STAIN_THRESHOLD, DEFAULT_TISSUE_RATIO, DEFAULT_TISSUE_VARIATION,
};
pub use encoder::{
    clamp_quality, is_valid_quality, OutputFormat, TileEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use geometry::{
    compute_region, enumerate_tiles, RegionOfInterest, TileCoordinate, TileGrid,
    DEFAULT_CROP_FRACTION,
};
pub use ops::DEFAULT_TARGET_SIZE;
pub use sink::{FileSink, TileSink};

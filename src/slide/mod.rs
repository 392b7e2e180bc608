//! Slide abstraction layer.
//!
//! The pipeline reads pixels through two traits and never sees a file format:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            TilingPipeline               │
//! └────────────────────┬────────────────────┘
//!                      │ open() once per worker
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           ImageSource trait             │
//! │  (factory, shared across threads)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SourceHandle trait            │
//! │  (level selection, region reads)        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     TiffSlideSource / TiffSlideHandle   │
//! │  (SVS and pyramidal TIFF via `tiff`)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_tiler::slide::{ImageSource, SourceHandle, TiffSlideSource};
//!
//! let source = TiffSlideSource::new();
//! let mut handle = source.open(Path::new("slide.svs"))?;
//! handle.select_level(1)?;
//! let tile = handle.read_region(0, 0, 448, 448)?;
//! ```

mod jpeg;
mod properties;
mod pyramid;
mod reader;
mod tiff_source;

pub use properties::{SlideFormat, SlideProperties};
pub use pyramid::{build_pyramid, IfdLayout, PyramidLevel, MAX_IFDS};
pub use reader::{check_region_bounds, Dimensions, ImageSource, LevelInfo, SourceHandle};
pub use tiff_source::{TiffSlideHandle, TiffSlideSource, DEFAULT_CHUNK_CACHE_CAPACITY};

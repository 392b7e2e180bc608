//! # WSI Tiler
//!
//! Extracts a grid of fixed-size tiles from Whole Slide Images (WSI), drops
//! tiles dominated by background or green/blue stain artifacts, and writes
//! the rest to disk as input for downstream image analysis.
//!
//! ## Features
//!
//! - **Parallel extraction**: a pool of blocking workers, each with its own
//!   slide handle, claims tiles dynamically from a shared cursor
//! - **Decoupled writes**: a single writer task drains a queue of kept tiles,
//!   so disk latency never stalls extraction
//! - **Format support**: Aperio SVS and pyramidal TIFF through the `tiff` crate
//! - **Filtering**: luminance-based background and green/blue stain heuristics
//!
//! ## Architecture
//!
//! - [`slide`] - Image source traits and the TIFF/SVS source
//! - [`tile`] - Geometry, pixel buffers, classifier, encoder, sink
//! - [`pipeline`] - Write queue, writer, workers, coordinator
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_tiler::{FileSink, PipelineConfig, TiffSlideSource, TilingPipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = TilingPipeline::new(
//!         TiffSlideSource::new(),
//!         FileSink::default(),
//!         PipelineConfig::default(),
//!     );
//!
//!     match pipeline.run("slide.svs", "tiles").await {
//!         Ok(summary) => println!("{}", summary),
//!         Err(e) => eprintln!("{}", e),
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, LevelsArgs, PipelineConfig, TileArgs};
pub use error::{PipelineError, SourceError, WriteError};
pub use pipeline::{
    tile_filename, FailureStage, RunSummary, TileFailure, TilingPipeline, WriteQueue, WriteTask,
    Writer, WriterReport,
};
pub use slide::{
    Dimensions, ImageSource, LevelInfo, SlideFormat, SlideProperties, SourceHandle,
    TiffSlideHandle, TiffSlideSource,
};
pub use tile::{
    compute_region, enumerate_tiles, is_mostly_background, is_mostly_stain_color,
    is_tissue_with_variation, BackgroundParams, FileSink, OutputFormat, RegionOfInterest,
    StainParams, TileBuffer, TileClassifier, TileCoordinate, TileEncoder, TileGrid, TileSink,
    TileVerdict, TissueParams,
};

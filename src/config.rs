//! Configuration management for WSI Tiler.
//!
//! This module provides:
//! - Command-line arguments via clap, with subcommands `tile` and `levels`
//! - Environment variables with the `WSI_TILER_` prefix
//! - [`PipelineConfig`], the plain value the library runs from
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_tiler::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Tile(args) = cli.command {
//!     let config = args.pipeline_config();
//!     config.validate()?;
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_TILER_LEVEL` - Resolution level / series (default: 0)
//! - `WSI_TILER_TILE_WIDTH`, `WSI_TILER_TILE_HEIGHT` - Tile size (default: 448)
//! - `WSI_TILER_CROP_FRACTION` - Fraction dropped from each edge (default: 0.25)
//! - `WSI_TILER_TARGET_SIZE` - Downsample target (default: 224)
//! - `WSI_TILER_TISSUE_FILTER` - Drop tiles that do not look like tissue (default: false)
//! - `WSI_TILER_WORKERS` - Worker threads (default: available cores)
//! - `WSI_TILER_FORMAT` - Output format: tif, png or jpg (default: tif)
//! - `WSI_TILER_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `WSI_TILER_CHUNK_CACHE` - Decoded chunks cached per worker (default: 16)

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::slide::DEFAULT_CHUNK_CACHE_CAPACITY;
use crate::tile::{
    is_valid_quality, BackgroundParams, OutputFormat, StainParams, TileClassifier, TissueParams,
    DEFAULT_BACKGROUND_RATIO, DEFAULT_BACKGROUND_THRESHOLD, DEFAULT_CROP_FRACTION,
    DEFAULT_JPEG_QUALITY, DEFAULT_STAIN_MARGIN, DEFAULT_STAIN_RATIO, DEFAULT_STAIN_THRESHOLD,
    DEFAULT_TARGET_SIZE, DEFAULT_TISSUE_RATIO, DEFAULT_TISSUE_VARIATION,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile edge in level pixels.
pub const DEFAULT_TILE_SIZE: u32 = 448;

/// Default resolution level.
pub const DEFAULT_LEVEL: usize = 0;

/// Number of workers when none is configured: one per available core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Settings for one tiling run. Built once and passed down read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub level: usize,
    pub tile_width: u32,
    pub tile_height: u32,
    pub crop_fraction: f64,
    pub target_size: u32,
    pub background: BackgroundParams,
    pub stain: StainParams,
    /// Optional pink/white tissue check
    pub tissue: Option<TissueParams>,
    pub workers: usize,
    pub normalize: bool,
    pub format: OutputFormat,
    pub jpeg_quality: u8,
    pub chunk_cache: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            crop_fraction: DEFAULT_CROP_FRACTION,
            target_size: DEFAULT_TARGET_SIZE,
            background: BackgroundParams::default(),
            stain: StainParams::default(),
            tissue: None,
            workers: default_workers(),
            normalize: false,
            format: OutputFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            chunk_cache: DEFAULT_CHUNK_CACHE_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err("tile width and height must be greater than 0".to_string());
        }

        if !(0.0..0.5).contains(&self.crop_fraction) {
            return Err("crop_fraction must be in [0, 0.5)".to_string());
        }

        if self.target_size == 0 {
            return Err("target_size must be greater than 0".to_string());
        }

        for (name, ratio) in [
            ("background_ratio", self.background.ratio),
            ("stain_ratio", self.stain.ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(format!("{} must be between 0 and 1", name));
            }
        }

        if let Some(tissue) = self.tissue {
            if !(0.0..=1.0).contains(&tissue.ratio) {
                return Err("tissue_ratio must be between 0 and 1".to_string());
            }
            if tissue.variation.is_nan() || tissue.variation < 0.0 {
                return Err("tissue_variation must be non-negative".to_string());
            }
        }

        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.chunk_cache == 0 {
            return Err("chunk_cache must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn classifier(&self) -> TileClassifier {
        let classifier = TileClassifier::new(self.background, self.stain);
        match self.tissue {
            Some(tissue) => classifier.with_tissue_filter(tissue),
            None => classifier,
        }
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Tiler - Extract informative tiles from Whole Slide Images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Tile a slide, drop background and stain tiles, write the rest.
    Tile(TileArgs),

    /// List the resolution levels of a slide.
    Levels(LevelsArgs),
}

/// Arguments of the `tile` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TileArgs {
    /// Path to the slide (SVS or pyramidal TIFF).
    pub image: PathBuf,

    /// Existing directory receiving the tiles.
    pub output_dir: PathBuf,

    // =========================================================================
    // Geometry
    // =========================================================================
    /// Resolution level to tile (0 = full resolution).
    #[arg(long, visible_alias = "series", default_value_t = DEFAULT_LEVEL, env = "WSI_TILER_LEVEL")]
    pub level: usize,

    /// Tile width in level pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILER_TILE_WIDTH")]
    pub tile_width: u32,

    /// Tile height in level pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILER_TILE_HEIGHT")]
    pub tile_height: u32,

    /// Fraction of width and height dropped from each edge.
    #[arg(long, default_value_t = DEFAULT_CROP_FRACTION, env = "WSI_TILER_CROP_FRACTION")]
    pub crop_fraction: f64,

    /// Edge of the square tiles are downsampled to.
    #[arg(long, default_value_t = DEFAULT_TARGET_SIZE, env = "WSI_TILER_TARGET_SIZE")]
    pub target_size: u32,

    // =========================================================================
    // Classifier
    // =========================================================================
    /// Luminance above which a pixel counts as background.
    #[arg(long, default_value_t = DEFAULT_BACKGROUND_THRESHOLD, env = "WSI_TILER_BACKGROUND_THRESHOLD")]
    pub background_threshold: u8,

    /// Share of background pixels above which a tile is dropped.
    #[arg(long, default_value_t = DEFAULT_BACKGROUND_RATIO, env = "WSI_TILER_BACKGROUND_RATIO")]
    pub background_ratio: f64,

    /// Minimum green/blue value for a stain pixel.
    #[arg(long, default_value_t = DEFAULT_STAIN_THRESHOLD, env = "WSI_TILER_STAIN_THRESHOLD")]
    pub stain_threshold: u8,

    /// Share of stain pixels above which a tile is dropped.
    #[arg(long, default_value_t = DEFAULT_STAIN_RATIO, env = "WSI_TILER_STAIN_RATIO")]
    pub stain_ratio: f64,

    /// How far the dominant channel must exceed the other two.
    #[arg(long, default_value_t = DEFAULT_STAIN_MARGIN, env = "WSI_TILER_STAIN_MARGIN")]
    pub stain_margin: u8,

    /// Also drop tiles that are not mostly pink/white with some texture.
    #[arg(long, default_value_t = false, env = "WSI_TILER_TISSUE_FILTER")]
    pub tissue_filter: bool,

    /// Share of pink/white pixels a tile must exceed (with `--tissue-filter`).
    #[arg(long, default_value_t = DEFAULT_TISSUE_RATIO, env = "WSI_TILER_TISSUE_RATIO")]
    pub tissue_ratio: f64,

    /// Mean RGB standard deviation a tile must exceed (with `--tissue-filter`).
    #[arg(long, default_value_t = DEFAULT_TISSUE_VARIATION, env = "WSI_TILER_TISSUE_VARIATION")]
    pub tissue_variation: f64,

    // =========================================================================
    // Execution
    // =========================================================================
    /// Number of extraction workers (default: available cores).
    #[arg(short, long, env = "WSI_TILER_WORKERS")]
    pub workers: Option<usize>,

    /// Stretch each channel to the full range before classifying.
    #[arg(long, default_value_t = false)]
    pub normalize: bool,

    /// Decoded chunks cached per worker.
    #[arg(long, default_value_t = DEFAULT_CHUNK_CACHE_CAPACITY, env = "WSI_TILER_CHUNK_CACHE")]
    pub chunk_cache: usize,

    // =========================================================================
    // Output
    // =========================================================================
    /// Output image format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Tiff, env = "WSI_TILER_FORMAT")]
    pub format: OutputFormat,

    /// JPEG quality (1-100), used with `--format jpg`.
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_TILER_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Print the run summary as JSON.
    #[arg(long, default_value_t = false)]
    pub summary_json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl TileArgs {
    /// Build the pipeline configuration from the parsed arguments.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            level: self.level,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            crop_fraction: self.crop_fraction,
            target_size: self.target_size,
            background: BackgroundParams {
                threshold: self.background_threshold,
                ratio: self.background_ratio,
            },
            stain: StainParams {
                threshold: self.stain_threshold,
                ratio: self.stain_ratio,
                margin: self.stain_margin,
            },
            tissue: self.tissue_filter.then_some(TissueParams {
                ratio: self.tissue_ratio,
                variation: self.tissue_variation,
            }),
            workers: self.workers.unwrap_or_else(default_workers),
            normalize: self.normalize,
            format: self.format,
            jpeg_quality: self.jpeg_quality,
            chunk_cache: self.chunk_cache,
        }
    }
}

/// Arguments of the `levels` subcommand.
#[derive(Args, Debug, Clone)]
pub struct LevelsArgs {
    /// Path to the slide (SVS or pyramidal TIFF).
    pub image: PathBuf,

    /// Print levels and properties as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================

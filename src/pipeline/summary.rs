//! Run summary and per-tile failure records.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::slide::{Dimensions, SlideProperties};
use crate::tile::{RegionOfInterest, TileCoordinate};

/// Maximum number of failure records kept per run. Counters stay exact.
pub const MAX_FAILURE_RECORDS: usize = 1000;

/// Pipeline stage at which a tile failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Read,
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Read => write!(f, "read"),
            FailureStage::Write => write!(f, "write"),
        }
    }
}

/// A tile that was skipped because of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileFailure {
    pub x: u32,
    pub y: u32,
    pub stage: FailureStage,
    pub message: String,
}

impl TileFailure {
    pub fn new(coordinate: &TileCoordinate, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            x: coordinate.x,
            y: coordinate.y,
            stage,
            message: message.into(),
        }
    }
}

/// Append a failure unless the record list is already full.
pub(crate) fn record_failure(records: &mut Vec<TileFailure>, failure: TileFailure) {
    if records.len() < MAX_FAILURE_RECORDS {
        records.push(failure);
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub image_path: PathBuf,
    pub output_dir: PathBuf,
    pub level: usize,
    pub dimensions: Dimensions,
    pub region: RegionOfInterest,
    pub tile_width: u32,
    pub tile_height: u32,

    /// Candidate tiles in the grid, before classification
    pub tiles_considered: u64,

    /// Tiles whose region read succeeded
    pub tiles_read: u64,
    pub tiles_written: u64,
    pub dropped_background: u64,
    pub dropped_stain: u64,
    /// Dropped by the optional tissue check
    pub dropped_no_tissue: u64,
    pub read_failures: u64,
    pub write_failures: u64,

    /// First [`MAX_FAILURE_RECORDS`] failures, read failures first
    pub failures: Vec<TileFailure>,

    pub workers: usize,
    pub cancelled: bool,
    pub elapsed_secs: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<SlideProperties>,
}

impl RunSummary {
    /// Tiles discarded by the classifier.
    pub fn tiles_dropped(&self) -> u64 {
        self.dropped_background + self.dropped_stain + self.dropped_no_tissue
    }

    /// Tiles that never reached the writer or failed there.
    pub fn tiles_failed(&self) -> u64 {
        self.read_failures + self.write_failures
    }

    /// Tiles never claimed because the run stopped early.
    pub fn tiles_skipped(&self) -> u64 {
        self.tiles_considered
            .saturating_sub(self.tiles_read + self.read_failures)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image:      {}", self.image_path.display())?;
        writeln!(
            f,
            "Level:      {} ({}x{}, {} channel(s))",
            self.level, self.dimensions.width, self.dimensions.height, self.dimensions.channels
        )?;
        writeln!(
            f,
            "Region:     [{}, {}) x [{}, {})",
            self.region.x_start, self.region.x_end, self.region.y_start, self.region.y_end
        )?;
        writeln!(
            f,
            "Tiles:      {} considered, {} read, {} written",
            self.tiles_considered, self.tiles_read, self.tiles_written
        )?;
        writeln!(
            f,
            "Dropped:    {} ({} background, {} stain, {} no tissue)",
            self.tiles_dropped(),
            self.dropped_background,
            self.dropped_stain,
            self.dropped_no_tissue
        )?;
        writeln!(
            f,
            "Failures:   {} read, {} write",
            self.read_failures, self.write_failures
        )?;
        if self.cancelled {
            writeln!(f, "Cancelled:  {} tile(s) not processed", self.tiles_skipped())?;
        }
        write!(
            f,
            "Workers:    {} in {:.2}s",
            self.workers, self.elapsed_secs
        )
    }
}

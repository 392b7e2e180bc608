//! Extraction workers.
//!
//! Each worker runs on its own blocking thread, opens its own
//! [`SourceHandle`] and claims tiles from a shared cursor over the flattened
//! grid until none remain:
//!
//! ```text
//! claim ─▶ read_region ─▶ downsample ─▶ (normalize) ─▶ classify ─┬─▶ push WriteTask
//!   ▲                                                            │
//!   └──────────────────────── next tile ◀────────────────────────┘ (dropped)
//! ```
//!
//! A failed region read skips the tile. A failed handle open raises the
//! shared abort flag so sibling workers stop claiming.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::queue::{WriteQueue, WriteTask};
use super::summary::{record_failure, FailureStage, TileFailure};
use crate::error::{PipelineError, SourceError};
use crate::slide::{ImageSource, SourceHandle};
use crate::tile::{ops, TileClassifier, TileCoordinate, TileGrid, TileVerdict};

/// Build the output filename for a tile from its level-space origin.
pub fn tile_filename(coordinate: &TileCoordinate, extension: &str) -> String {
    format!("tile_{}_{}.{}", coordinate.x, coordinate.y, extension)
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters shared by all workers of a run.
#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    pub read: AtomicU64,
    pub enqueued: AtomicU64,
    pub dropped_background: AtomicU64,
    pub dropped_stain: AtomicU64,
    pub dropped_no_tissue: AtomicU64,
    pub read_failures: AtomicU64,
    pub failures: Mutex<Vec<TileFailure>>,
}

impl WorkerStats {
    fn record_read_failure(&self, coordinate: &TileCoordinate, error: &SourceError) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
        record_failure(
            &mut self.failures.lock(),
            TileFailure::new(coordinate, FailureStage::Read, error.to_string()),
        );
    }
}

// =============================================================================
// Shared Context
// =============================================================================

/// Per-tile processing settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TileSettings {
    pub level: usize,
    pub target_size: u32,
    pub normalize: bool,
    pub classifier: TileClassifier,
    pub extension: &'static str,
}

/// State shared by every worker of one run.
pub(crate) struct WorkerContext<S> {
    source: Arc<S>,
    image_path: PathBuf,
    output_dir: PathBuf,
    grid: TileGrid,
    settings: TileSettings,
    queue: Arc<WriteQueue>,
    cursor: AtomicUsize,
    abort: AtomicBool,
    cancel: CancellationToken,
    pub stats: WorkerStats,
}

impl<S: ImageSource> WorkerContext<S> {
    pub fn new(
        source: Arc<S>,
        image_path: &Path,
        output_dir: &Path,
        grid: TileGrid,
        settings: TileSettings,
        queue: Arc<WriteQueue>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            image_path: image_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            grid,
            settings,
            queue,
            cursor: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            cancel,
            stats: WorkerStats::default(),
        }
    }

    /// Stop every worker at its next claim.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Claim the next unprocessed tile, if the run is still going.
    fn claim(&self) -> Option<TileCoordinate> {
        if self.abort.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.grid.get(index)
    }

    fn open_handle(&self) -> Result<S::Handle, SourceError> {
        let mut handle = self.source.open(&self.image_path)?;
        handle.select_level(self.settings.level)?;
        Ok(handle)
    }
}

// =============================================================================
// Worker Loop
// =============================================================================

/// Body of one extraction worker. Blocking.
pub(crate) fn run_worker<S: ImageSource>(
    worker: usize,
    ctx: &WorkerContext<S>,
) -> Result<(), PipelineError> {
    let mut handle = match ctx.open_handle() {
        Ok(handle) => handle,
        Err(source) => {
            ctx.abort();
            return Err(PipelineError::WorkerInit { worker, source });
        }
    };
    debug!(worker, "worker started");

    let mut claimed = 0u64;
    while let Some(coordinate) = ctx.claim() {
        claimed += 1;
        process_tile(&mut handle, coordinate, ctx);
    }

    drop(handle);
    debug!(worker, tiles = claimed, "worker finished");
    Ok(())
}

fn process_tile<S: ImageSource>(
    handle: &mut S::Handle,
    coordinate: TileCoordinate,
    ctx: &WorkerContext<S>,
) {
    let TileCoordinate {
        x,
        y,
        width,
        height,
    } = coordinate;

    let tile = match handle.read_region(x, y, width, height) {
        Ok(tile) => tile,
        Err(e) => {
            warn!(x, y, error = %e, "tile read failed, skipping");
            ctx.stats.record_read_failure(&coordinate, &e);
            return;
        }
    };
    ctx.stats.read.fetch_add(1, Ordering::Relaxed);

    let settings = &ctx.settings;
    let mut tile = ops::downsample_to_target(tile, settings.target_size);
    if settings.normalize {
        tile = ops::autocontrast(tile);
    }

    match settings.classifier.classify(&tile) {
        TileVerdict::Keep => {}
        TileVerdict::Background => {
            debug!(x, y, "dropped background tile");
            ctx.stats.dropped_background.fetch_add(1, Ordering::Relaxed);
            return;
        }
        TileVerdict::Stain => {
            debug!(x, y, "dropped stain tile");
            ctx.stats.dropped_stain.fetch_add(1, Ordering::Relaxed);
            return;
        }
        TileVerdict::NoTissue => {
            debug!(x, y, "dropped tile without tissue");
            ctx.stats.dropped_no_tissue.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }

    let path = ctx
        .output_dir
        .join(tile_filename(&coordinate, settings.extension));
    ctx.queue.push(WriteTask {
        coordinate,
        path,
        tile,
    });
    ctx.stats.enqueued.fetch_add(1, Ordering::Relaxed);
}

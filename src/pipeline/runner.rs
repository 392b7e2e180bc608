//! Tiling pipeline coordinator.
//!
//! One run goes through these steps:
//!
//! 1. Validate the configuration and the output directory
//! 2. Open a metadata handle, select the level, read dimensions, drop it
//! 3. Compute the region of interest and the tile grid
//! 4. Start the writer task
//! 5. Start the workers on the blocking pool and wait for them
//! 6. Finish the queue, wait for the writer to drain it
//! 7. Assemble the [`RunSummary`]

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::queue::{WriteQueue, Writer};
use super::summary::{record_failure, RunSummary};
use super::worker::{run_worker, TileSettings, WorkerContext};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, SourceError};
use crate::slide::{Dimensions, ImageSource, SlideProperties, SourceHandle};
use crate::tile::{compute_region, TileGrid, TileSink};

/// Level metadata read by the coordinator before any worker starts.
#[derive(Debug, Clone)]
struct SlideMetadata {
    dimensions: Dimensions,
    properties: Option<SlideProperties>,
}

/// Runs the tiling pipeline over one slide at a time.
///
/// The source opens one handle per worker; the sink receives every kept
/// tile from the single writer task.
pub struct TilingPipeline<S, K> {
    source: Arc<S>,
    sink: Arc<K>,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl<S: ImageSource, K: TileSink> TilingPipeline<S, K> {
    pub fn new(source: S, sink: K, config: PipelineConfig) -> Self {
        Self {
            source: Arc::new(source),
            sink: Arc::new(sink),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop claiming tiles once `cancel` fires. Queued writes still drain.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tile `image_path` into the existing directory `output_dir`.
    pub async fn run(
        &self,
        image_path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let image_path = image_path.as_ref().to_path_buf();
        let output_dir = output_dir.as_ref().to_path_buf();

        self.config
            .validate()
            .map_err(PipelineError::InvalidConfig)?;

        let is_dir = tokio::fs::metadata(&output_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(PipelineError::OutputDir(output_dir));
        }

        let metadata = self.read_metadata(&image_path).await?;
        let dimensions = metadata.dimensions;
        let region = compute_region(dimensions.width, dimensions.height, self.config.crop_fraction);
        let grid = TileGrid::new(region, self.config.tile_width, self.config.tile_height);
        let worker_count = self.config.workers.min(grid.len());

        info!(
            image = %image_path.display(),
            level = self.config.level,
            width = dimensions.width,
            height = dimensions.height,
            channels = dimensions.channels,
            "starting tiling run"
        );
        info!(
            x_start = region.x_start,
            y_start = region.y_start,
            x_end = region.x_end,
            y_end = region.y_end,
            columns = grid.columns(),
            rows = grid.rows(),
            tiles = grid.len(),
            workers = worker_count,
            "tile grid ready"
        );
        if let Some(properties) = &metadata.properties {
            info!(
                format = properties.format.name(),
                mpp = ?properties.mpp,
                magnification = ?properties.magnification,
                "slide properties"
            );
        }

        let queue = Arc::new(WriteQueue::new());
        let writer = tokio::spawn(Writer::new(Arc::clone(&queue), Arc::clone(&self.sink)).run());

        let ctx = Arc::new(WorkerContext::new(
            Arc::clone(&self.source),
            &image_path,
            &output_dir,
            grid,
            TileSettings {
                level: self.config.level,
                target_size: self.config.target_size,
                normalize: self.config.normalize,
                classifier: self.config.classifier(),
                extension: self.config.format.extension(),
            },
            Arc::clone(&queue),
            self.cancel.clone(),
        ));

        let handles: Vec<_> = (0..worker_count)
            .map(|worker| {
                let ctx = Arc::clone(&ctx);
                tokio::task::spawn_blocking(move || run_worker(worker, &ctx))
            })
            .collect();

        let mut fatal: Option<PipelineError> = None;
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    ctx.abort();
                    Err(PipelineError::WorkerPanicked(e.to_string()))
                }
            };
            if let Err(e) = result {
                fatal.get_or_insert(e);
            }
        }

        queue.finish();
        let report = writer
            .await
            .map_err(|e| PipelineError::WriterPanicked(e.to_string()))?;

        if let Some(e) = fatal {
            error!(error = %e, written = report.written, "tiling run aborted");
            return Err(e);
        }

        let stats = &ctx.stats;
        let mut failures = std::mem::take(&mut *stats.failures.lock());
        for failure in report.failures {
            record_failure(&mut failures, failure);
        }

        let summary = RunSummary {
            image_path,
            output_dir,
            level: self.config.level,
            dimensions,
            region,
            tile_width: self.config.tile_width,
            tile_height: self.config.tile_height,
            tiles_considered: grid.len() as u64,
            tiles_read: stats.read.load(Ordering::Relaxed),
            tiles_written: report.written,
            dropped_background: stats.dropped_background.load(Ordering::Relaxed),
            dropped_stain: stats.dropped_stain.load(Ordering::Relaxed),
            dropped_no_tissue: stats.dropped_no_tissue.load(Ordering::Relaxed),
            read_failures: stats.read_failures.load(Ordering::Relaxed),
            write_failures: report.failed,
            failures,
            workers: worker_count,
            cancelled: self.cancel.is_cancelled(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            properties: metadata.properties,
        };

        info!(
            considered = summary.tiles_considered,
            written = summary.tiles_written,
            dropped = summary.tiles_dropped(),
            read_failures = summary.read_failures,
            write_failures = summary.write_failures,
            cancelled = summary.cancelled,
            elapsed_secs = summary.elapsed_secs,
            "tiling run complete"
        );

        Ok(summary)
    }

    /// Open a throwaway handle to read level metadata.
    async fn read_metadata(&self, image_path: &Path) -> Result<SlideMetadata, PipelineError> {
        let source = Arc::clone(&self.source);
        let path: PathBuf = image_path.to_path_buf();
        let level = self.config.level;

        let metadata = tokio::task::spawn_blocking(move || {
            let mut handle = source.open(&path)?;
            handle.select_level(level)?;
            Ok::<_, SourceError>(SlideMetadata {
                dimensions: handle.dimensions(),
                properties: handle.properties().cloned(),
            })
        })
        .await
        .map_err(|e| PipelineError::WorkerPanicked(e.to_string()))??;

        Ok(metadata)
    }
}

//! End-to-end pipeline tests.
//!
//! Tests verify:
//! - The 2000x1600 / crop 0.25 / 448 tile scenario yields 6 candidates
//! - Background and stain tiles are dropped, the rest written once
//! - Output files are named after the original coordinates and decode back
//! - Read and write failures are contained, worker init failures are fatal
//! - JPEG-compressed slides are classified on RGB pixels
//! - The optional tissue filter drops flat tiles
//! - Many workers never write a tile twice

use tokio_util::sync::CancellationToken;

use wsi_tiler::{
    FailureStage, FileSink, OutputFormat, PipelineConfig, PipelineError, SourceError,
    TiffSlideSource, TileEncoder, TilingPipeline, TissueParams,
};

use super::test_utils::{
    jpeg_slide, list_files, three_band_slide, two_level_slide, write_slide, FaultySource,
    LimitedSource, RecordingSink, RejectingSink, TiffBuilder, TiledImage, PHOTOMETRIC_RGB,
    PHOTOMETRIC_YCBCR, RED, TISSUE,
};

fn config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        workers,
        ..PipelineConfig::default()
    }
}

// =============================================================================
// End-to-End Scenario
// =============================================================================

#[tokio::test]
async fn test_three_band_slide() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    let pipeline = TilingPipeline::new(TiffSlideSource::new(), FileSink::default(), config(4));
    let summary = pipeline.run(&slide, out.path()).await.unwrap();

    assert_eq!(summary.dimensions.width, 2000);
    assert_eq!(summary.dimensions.height, 1600);
    assert_eq!(
        (
            summary.region.x_start,
            summary.region.y_start,
            summary.region.x_end,
            summary.region.y_end
        ),
        (500, 400, 1500, 1200)
    );
    assert_eq!(summary.tiles_considered, 6);
    assert_eq!(summary.tiles_read, 6);
    assert_eq!(summary.dropped_background, 2);
    assert_eq!(summary.dropped_stain, 2);
    assert_eq!(summary.tiles_written, 2);
    assert_eq!(summary.tiles_failed(), 0);
    assert!(summary.properties.is_some());

    assert_eq!(
        list_files(out.path()),
        vec!["tile_948_400.tif", "tile_948_848.tif"]
    );
}

#[tokio::test]
async fn test_written_tiles_are_downsampled() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    let pipeline = TilingPipeline::new(TiffSlideSource::new(), FileSink::default(), config(2));
    pipeline.run(&slide, out.path()).await.unwrap();

    let tile = image::open(out.path().join("tile_948_400.tif"))
        .unwrap()
        .to_rgb8();
    assert_eq!(tile.dimensions(), (224, 224));

    let center = tile.get_pixel(112, 112).0;
    for (got, want) in center.iter().zip(TISSUE) {
        assert!((*got as i16 - want as i16).abs() <= 1);
    }
}

#[tokio::test]
async fn test_reduced_level_and_png_output() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "pyramid.tif", &two_level_slide());
    let out = tempfile::tempdir().unwrap();

    let mut cfg = config(2);
    cfg.level = 1;
    cfg.format = OutputFormat::Png;
    let sink = FileSink::new(TileEncoder::new(OutputFormat::Png));
    let pipeline = TilingPipeline::new(TiffSlideSource::new(), sink, cfg);

    let summary = pipeline.run(&slide, out.path()).await.unwrap();
    // Region [300, 900) x [125, 375): one full and one 152 wide column
    assert_eq!(summary.tiles_considered, 2);
    assert_eq!(summary.tiles_written, 2);
    assert_eq!(
        list_files(out.path()),
        vec!["tile_300_125.png", "tile_748_125.png"]
    );

    // 152x250 exceeds the target in height only: still squared to 224
    let clipped = image::open(out.path().join("tile_748_125.png")).unwrap();
    assert_eq!((clipped.width(), clipped.height()), (224, 224));
}

#[tokio::test]
async fn test_small_tiles_pass_through_as_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "pyramid.tif", &two_level_slide());
    let out = tempfile::tempdir().unwrap();

    let mut cfg = config(3);
    cfg.tile_width = 200;
    cfg.tile_height = 100;
    cfg.format = OutputFormat::Jpeg;
    let sink = FileSink::new(TileEncoder::new(OutputFormat::Jpeg).with_quality(90));
    let pipeline = TilingPipeline::new(TiffSlideSource::new(), sink, cfg);

    let summary = pipeline.run(&slide, out.path()).await.unwrap();
    // Region 1200x500 at level 0: 6 columns x 5 rows
    assert_eq!(summary.tiles_considered, 30);
    assert_eq!(summary.tiles_written, 30);

    let tile = image::open(out.path().join("tile_600_250.jpg")).unwrap();
    assert_eq!((tile.width(), tile.height()), (200, 100));
}

#[tokio::test]
async fn test_jpeg_slide_red_tissue_kept_white_dropped() {
    for (photometric, shared_tables) in [(PHOTOMETRIC_YCBCR, true), (PHOTOMETRIC_RGB, false)] {
        let dir = tempfile::tempdir().unwrap();
        let slide = write_slide(dir.path(), "jpeg.svs", &jpeg_slide(photometric, shared_tables));
        let out = tempfile::tempdir().unwrap();

        let pipeline = TilingPipeline::new(TiffSlideSource::new(), FileSink::default(), config(2));
        let summary = pipeline.run(&slide, out.path()).await.unwrap();

        assert_eq!(summary.tiles_considered, 2);
        assert_eq!(summary.dropped_background, 1);
        assert_eq!(summary.dropped_stain, 0);
        assert_eq!(summary.tiles_written, 1);
        assert_eq!(list_files(out.path()), vec!["tile_300_150.tif"]);

        let written = image::open(out.path().join("tile_300_150.tif"))
            .unwrap()
            .to_rgb8();
        let center = written.get_pixel(112, 112).0;
        for (got, want) in center.iter().zip(RED) {
            assert!((*got as i16 - want as i16).abs() <= 8, "{:?}", center);
        }
    }
}

#[tokio::test]
async fn test_tissue_filter_drops_flat_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    let mut cfg = config(2);
    cfg.tissue = Some(TissueParams::default());
    let pipeline = TilingPipeline::new(TiffSlideSource::new(), FileSink::default(), cfg);
    let summary = pipeline.run(&slide, out.path()).await.unwrap();

    // The two kept tissue tiles are a single flat color
    assert_eq!(summary.dropped_background, 2);
    assert_eq!(summary.dropped_stain, 2);
    assert_eq!(summary.dropped_no_tissue, 2);
    assert_eq!(summary.tiles_dropped(), 6);
    assert_eq!(summary.tiles_written, 0);
    assert!(list_files(out.path()).is_empty());
}

// =============================================================================
// Failure Handling
// =============================================================================

#[tokio::test]
async fn test_read_failures_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    let pipeline = TilingPipeline::new(FaultySource::new(948), FileSink::default(), config(3));
    let summary = pipeline.run(&slide, out.path()).await.unwrap();

    assert_eq!(summary.read_failures, 2);
    assert_eq!(summary.tiles_read, 4);
    assert_eq!(summary.tiles_written, 0);
    assert_eq!(summary.failures.len(), 2);
    assert!(summary
        .failures
        .iter()
        .all(|f| f.x == 948 && f.stage == FailureStage::Read));
    assert!(list_files(out.path()).is_empty());
}

#[tokio::test]
async fn test_write_failure_is_logged_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    let pipeline = TilingPipeline::new(
        TiffSlideSource::new(),
        RejectingSink::new("tile_948_848"),
        config(2),
    );
    let summary = pipeline.run(&slide, out.path()).await.unwrap();

    assert_eq!(summary.tiles_written, 1);
    assert_eq!(summary.write_failures, 1);
    assert_eq!(summary.failures[0].stage, FailureStage::Write);
    assert_eq!((summary.failures[0].x, summary.failures[0].y), (948, 848));
    assert_eq!(list_files(out.path()), vec!["tile_948_400.tif"]);
}

#[tokio::test]
async fn test_worker_init_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    // Metadata handle and one worker succeed, the other workers cannot open
    let pipeline = TilingPipeline::new(LimitedSource::new(2), RecordingSink::default(), config(4));
    let err = pipeline.run(&slide, out.path()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::WorkerInit {
            source: SourceError::CannotOpen { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_unopenable_slide_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("bogus.svs");
    std::fs::write(&bogus, b"not a tiff at all").unwrap();

    let pipeline = TilingPipeline::new(TiffSlideSource::new(), RecordingSink::default(), config(2));
    let err = pipeline.run(&bogus, out.path()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::CannotOpen { .. })
    ));
}

#[tokio::test]
async fn test_invalid_level_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    let mut cfg = config(2);
    cfg.level = 13;
    let pipeline = TilingPipeline::new(TiffSlideSource::new(), RecordingSink::default(), cfg);
    let err = pipeline.run(&slide, out.path()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::InvalidLevel { level: 13, count: 1 })
    ));
}

#[tokio::test]
async fn test_unsupported_layout_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let builder = TiffBuilder::new()
        .add_image(TiledImage::new(1200, 600, |_, _| TISSUE).with_bits_per_sample(16));
    let slide = write_slide(dir.path(), "deep.tif", &builder);
    let out = tempfile::tempdir().unwrap();

    let pipeline = TilingPipeline::new(TiffSlideSource::new(), RecordingSink::default(), config(2));
    let err = pipeline.run(&slide, out.path()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Source(SourceError::Unsupported(_))
    ));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_workers_write_each_tile_once() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "pyramid.tif", &two_level_slide());
    let out = tempfile::tempdir().unwrap();

    let mut cfg = config(8);
    cfg.crop_fraction = 0.0;
    cfg.tile_width = 100;
    cfg.tile_height = 100;
    let sink = RecordingSink::default();
    let pipeline = TilingPipeline::new(LimitedSource::unlimited(), sink.clone(), cfg);

    let summary = pipeline.run(&slide, out.path()).await.unwrap();
    assert_eq!(summary.tiles_considered, 240);
    assert_eq!(summary.tiles_written, 240);
    assert_eq!(summary.workers, 8);

    let counts = sink.write_counts();
    assert_eq!(counts.len(), 240);
    assert!(counts.values().all(|&n| n == 1));
    assert!(counts.contains_key(&out.path().join("tile_2300_900.tif")));
}

#[tokio::test]
async fn test_cancelled_run_reports_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let out = tempfile::tempdir().unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let pipeline = TilingPipeline::new(TiffSlideSource::new(), FileSink::default(), config(2))
        .with_cancellation(cancel);

    let summary = pipeline.run(&slide, out.path()).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.tiles_written, 0);
    assert_eq!(summary.tiles_skipped(), 6);
    assert!(list_files(out.path()).is_empty());
}

#[tokio::test]
async fn test_output_dir_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let slide = write_slide(dir.path(), "slide.svs", &three_band_slide());
    let missing = dir.path().join("missing");

    let pipeline = TilingPipeline::new(TiffSlideSource::new(), FileSink::default(), config(2));
    let err = pipeline.run(&slide, &missing).await.unwrap_err();
    assert!(matches!(err, PipelineError::OutputDir(_)));
    assert!(!missing.exists());
}

//! WSI Tiler - Extract informative tiles from Whole Slide Images.
//!
//! This binary parses the command line, sets up logging and runs either the
//! tiling pipeline or the level listing.

use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    config::{Cli, Command, LevelsArgs, PipelineConfig, TileArgs},
    slide::{ImageSource, LevelInfo, SlideProperties, SourceHandle, TiffSlideSource},
    tile::{FileSink, TileEncoder},
    TilingPipeline,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Tile(args) => run_tile(args).await,
        Command::Levels(args) => run_levels(args).await,
    }
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(args: TileArgs) -> ExitCode {
    init_logging(args.verbose);

    let config = args.pipeline_config();
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = TiffSlideSource::with_chunk_cache(config.chunk_cache);
    let sink = FileSink::new(TileEncoder::new(config.format).with_quality(config.jpeg_quality));

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let pipeline = TilingPipeline::new(source, sink, config).with_cancellation(cancel);
    log_config(&args, pipeline.config());

    let summary = match pipeline.run(&args.image, &args.output_dir).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Tiling failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.summary_json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", summary);
        for failure in &summary.failures {
            println!(
                "  {} failure at ({}, {}): {}",
                failure.stage, failure.x, failure.y, failure.message
            );
        }
    }

    if summary.cancelled {
        warn!("Run cancelled before all tiles were processed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn log_config(args: &TileArgs, config: &PipelineConfig) {
    info!("Configuration:");
    info!("  Image: {}", args.image.display());
    info!("  Output: {}", args.output_dir.display());
    info!(
        "  Level: {}, tile {}x{}, crop {}, target {}",
        config.level, config.tile_width, config.tile_height, config.crop_fraction, config.target_size
    );
    info!(
        "  Workers: {}, format: {}, tissue filter: {}",
        config.workers,
        config.format.extension(),
        if config.tissue.is_some() { "on" } else { "off" }
    );
}

/// Cancel the run on the first Ctrl-C.
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing queued writes");
            cancel.cancel();
        }
    });
}

// =============================================================================
// Levels Command
// =============================================================================

async fn run_levels(args: LevelsArgs) -> ExitCode {
    if args.verbose {
        init_logging(true);
    }

    let path = args.image.clone();
    let listing = tokio::task::spawn_blocking(move || {
        let handle = TiffSlideSource::new().open(&path)?;
        let levels: Vec<LevelInfo> = (0..handle.level_count())
            .filter_map(|level| handle.level_info(level))
            .collect();
        Ok::<_, wsi_tiler::SourceError>((levels, handle.properties().cloned()))
    })
    .await;

    let (levels, properties) = match listing {
        Ok(Ok(listing)) => listing,
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        let json = serde_json::json!({
            "image": args.image,
            "levels": levels,
            "properties": properties,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_levels(&args, &levels, properties.as_ref());
    }

    ExitCode::SUCCESS
}

fn print_levels(args: &LevelsArgs, levels: &[LevelInfo], properties: Option<&SlideProperties>) {
    println!("{}", args.image.display());
    if let Some(properties) = properties {
        print!("  Format: {}", properties.format.name());
        if let Some(mag) = properties.magnification {
            print!(", {}x", mag);
        }
        if let Some(mpp) = properties.mpp {
            print!(", {} µm/px", mpp);
        }
        println!();
    }
    println!();
    println!("  Level  Width     Height    Chunk      Channels  Downsample");
    println!("  ─────  ────────  ────────  ─────────  ────────  ──────────");
    for info in levels {
        let channels = info
            .channels
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<5}  {:<8}  {:<8}  {:<9}  {:<8}  {:.2}",
            info.level,
            info.width,
            info.height,
            format!("{}x{}", info.chunk_width, info.chunk_height),
            channels,
            info.downsample
        );
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

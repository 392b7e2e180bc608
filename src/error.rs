use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an image source or one of its handles.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The slide could not be opened or its structure could not be parsed
    #[error("Cannot open {path}: {message}")]
    CannotOpen { path: PathBuf, message: String },

    /// Requested resolution level does not exist
    #[error("Invalid level {level}: slide has {count} level(s)")]
    InvalidLevel { level: usize, count: usize },

    /// A single region read failed
    #[error("Read failed for region {width}x{height} at ({x}, {y}): {message}")]
    ReadFailed {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        message: String,
    },

    /// Pixel layout the pipeline cannot handle (bit depth, sample format)
    #[error("Unsupported pixel layout: {0}")]
    Unsupported(String),
}

/// Errors that can occur when persisting a single tile.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// Encoding the pixel buffer failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// Writing the encoded bytes to disk failed
    #[error("I/O error for {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Run-level errors. Every variant aborts the pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Output directory is missing or not a directory
    #[error("Output directory {0} does not exist or is not a directory")]
    OutputDir(PathBuf),

    /// The metadata handle could not be opened or the level is invalid
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// A worker could not establish its own source handle
    #[error("Worker {worker} failed to open its source handle: {source}")]
    WorkerInit { worker: usize, source: SourceError },

    /// A worker thread panicked
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// The writer task panicked or was aborted
    #[error("Writer panicked: {0}")]
    WriterPanicked(String),
}

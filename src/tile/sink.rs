//! Destination for kept tiles.
//!
//! The writer hands every kept tile to a [`TileSink`]. [`FileSink`] encodes
//! the tile on the blocking pool and writes it with `tokio::fs`, so neither
//! encoding nor slow filesystems hold up the runtime threads.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::encoder::TileEncoder;
use super::TileBuffer;
use crate::error::WriteError;

/// Persists one tile at a destination path.
///
/// Called only from the single writer task, one tile at a time.
#[async_trait]
pub trait TileSink: Send + Sync + 'static {
    async fn write(&self, path: &Path, tile: &TileBuffer) -> Result<(), WriteError>;
}

/// Writes tiles to the local filesystem with a [`TileEncoder`].
#[derive(Debug, Clone, Default)]
pub struct FileSink {
    encoder: TileEncoder,
}

impl FileSink {
    pub fn new(encoder: TileEncoder) -> Self {
        Self { encoder }
    }
}

#[async_trait]
impl TileSink for FileSink {
    async fn write(&self, path: &Path, tile: &TileBuffer) -> Result<(), WriteError> {
        let encode_error = |message: String| WriteError::Encode {
            path: path.to_path_buf(),
            message,
        };

        let encoder = self.encoder;
        let owned = tile.clone();
        let bytes = tokio::task::spawn_blocking(move || encoder.encode(&owned))
            .await
            .map_err(|e| encode_error(e.to_string()))?
            .map_err(|e| encode_error(e.to_string()))?;

        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| WriteError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!(path = %path.display(), bytes = bytes.len(), "tile written");
        Ok(())
    }
}

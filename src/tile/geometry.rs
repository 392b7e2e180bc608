//! Region of interest and tile grid computation.
//!
//! Everything here is a pure function of the image dimensions, the crop
//! fraction and the tile size. The grid is never materialized: a
//! [`TileGrid`] maps a flattened index to its [`TileCoordinate`], which lets
//! any number of workers claim tiles by index without coordinating beyond a
//! shared counter.

use serde::Serialize;

/// Default fraction of width/height dropped from each edge.
pub const DEFAULT_CROP_FRACTION: f64 = 0.25;

// =============================================================================
// Region of Interest
// =============================================================================

/// The sub-rectangle of the level actually tiled, as `[x_start, x_end) ×
/// [y_start, y_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionOfInterest {
    pub x_start: u32,
    pub y_start: u32,
    pub x_end: u32,
    pub y_end: u32,
}

impl RegionOfInterest {
    pub fn width(&self) -> u32 {
        self.x_end.saturating_sub(self.x_start)
    }

    pub fn height(&self) -> u32 {
        self.y_end.saturating_sub(self.y_start)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Whether a tile lies entirely inside the region.
    pub fn contains(&self, tile: &TileCoordinate) -> bool {
        tile.x >= self.x_start
            && tile.y >= self.y_start
            && tile.x + tile.width <= self.x_end
            && tile.y + tile.height <= self.y_end
    }
}

/// Compute the region left after dropping `crop_fraction` of the width and
/// height from each edge.
///
/// The crop is symmetric: `x_start = floor(width * crop_fraction)` and
/// `x_end = width - x_start`. Fractions at or above 0.5 yield an empty region.
pub fn compute_region(width: u32, height: u32, crop_fraction: f64) -> RegionOfInterest {
    let fraction = crop_fraction.clamp(0.0, 0.5);
    let x_start = (width as f64 * fraction).floor() as u32;
    let y_start = (height as f64 * fraction).floor() as u32;

    RegionOfInterest {
        x_start,
        y_start,
        x_end: width - x_start.min(width),
        y_end: height - y_start.min(height),
    }
}

// =============================================================================
// Tile Coordinates
// =============================================================================

/// Origin and extent of one tile in level pixel space.
///
/// Width and height are already clipped to the region edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileCoordinate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileCoordinate {
    /// Number of pixels covered by this tile.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

// =============================================================================
// Tile Grid
// =============================================================================

/// Lazily indexable grid of tiles covering a region of interest.
///
/// Index order is x-outer / y-inner: index `i` maps to column `i / rows` and
/// row `i % rows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    region: RegionOfInterest,
    tile_width: u32,
    tile_height: u32,
    columns: u32,
    rows: u32,
}

impl TileGrid {
    /// Build the grid for a region. A zero tile dimension yields an empty grid.
    pub fn new(region: RegionOfInterest, tile_width: u32, tile_height: u32) -> Self {
        let (columns, rows) = if tile_width == 0 || tile_height == 0 || region.is_empty() {
            (0, 0)
        } else {
            (
                region.width().div_ceil(tile_width),
                region.height().div_ceil(tile_height),
            )
        };

        Self {
            region,
            tile_width,
            tile_height,
            columns,
            rows,
        }
    }

    pub fn region(&self) -> RegionOfInterest {
        self.region
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of tiles.
    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinate of the tile at a flattened index.
    pub fn get(&self, index: usize) -> Option<TileCoordinate> {
        if index >= self.len() {
            return None;
        }

        let column = (index / self.rows as usize) as u32;
        let row = (index % self.rows as usize) as u32;

        let x = self.region.x_start + column * self.tile_width;
        let y = self.region.y_start + row * self.tile_height;

        Some(TileCoordinate {
            x,
            y,
            width: self.tile_width.min(self.region.x_end - x),
            height: self.tile_height.min(self.region.y_end - y),
        })
    }
}

/// Enumerate the tiles covering `region` with strides of `tile_width` ×
/// `tile_height`, clipping trailing tiles to the region edge.
pub fn enumerate_tiles(
    region: RegionOfInterest,
    tile_width: u32,
    tile_height: u32,
) -> impl Iterator<Item = TileCoordinate> {
    let grid = TileGrid::new(region, tile_width, tile_height);
    (0..grid.len()).filter_map(move |index| grid.get(index))
}

// =============================================================================
// Tests
// =============================================================================

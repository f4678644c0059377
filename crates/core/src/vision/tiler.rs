use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, Result};

pub const DEFAULT_TILE_SIZE: u32 = 448;
pub const DEFAULT_MIN_TILES: u32 = 1;
pub const DEFAULT_MAX_TILES: u32 = 12;

/// Bounds for dynamic tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub tile_size: u32,
    pub min_tiles: u32,
    pub max_tiles: u32,
    pub use_thumbnail: bool,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            min_tiles: DEFAULT_MIN_TILES,
            max_tiles: DEFAULT_MAX_TILES,
            use_thumbnail: true,
        }
    }
}

impl TilingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_tiles == 0
            || self.max_tiles == 0
            || self.min_tiles > self.max_tiles
            || self.tile_size == 0
        {
            return Err(AdapterError::InvalidTilingConstraint {
                min_tiles: self.min_tiles,
                max_tiles: self.max_tiles,
                tile_size: self.tile_size,
            });
        }
        Ok(())
    }
}

/// Grid of `cols x rows` tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilingGrid {
    pub cols: u32,
    pub rows: u32,
}

impl TilingGrid {
    pub const fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    pub fn tiles(self) -> u32 {
        self.cols * self.rows
    }

    pub fn aspect_ratio(self) -> f64 {
        self.cols as f64 / self.rows as f64
    }

    pub fn is_single(self) -> bool {
        self.cols == 1 && self.rows == 1
    }
}

/// Enumerate every grid whose tile count lies in `[min_tiles, max_tiles]`.
///
/// Ordered by tile count, then by `(cols, rows)`, so scans over the result are
/// reproducible.
pub fn candidate_grids(config: &TilingConfig) -> Result<Vec<TilingGrid>> {
    config.validate()?;
    let TilingConfig {
        min_tiles,
        max_tiles,
        ..
    } = *config;
    let mut unique = BTreeSet::new();
    for n in min_tiles..=max_tiles {
        for i in 1..=n {
            for j in 1..=n {
                if i * j <= max_tiles && i * j >= min_tiles {
                    unique.insert(TilingGrid::new(i, j));
                }
            }
        }
    }
    let mut grids: Vec<TilingGrid> = unique.into_iter().collect();
    grids.sort_by_key(|grid| grid.tiles());
    Ok(grids)
}

/// Pick the candidate whose aspect ratio is closest to `aspect_ratio`.
///
/// On an exact tie the later (finer) grid wins only when the source has more
/// than half the pixels that grid would hold.
pub fn find_closest_aspect_ratio(
    aspect_ratio: f64,
    candidates: &[TilingGrid],
    width: u32,
    height: u32,
    tile_size: u32,
) -> TilingGrid {
    let mut best = TilingGrid::new(1, 1);
    let mut best_diff = f64::MAX;
    let area = width as f64 * height as f64;
    let tile_area = tile_size as f64 * tile_size as f64;

    for &grid in candidates {
        let diff = (aspect_ratio - grid.aspect_ratio()).abs();
        if diff < best_diff {
            best_diff = diff;
            best = grid;
        } else if (diff - best_diff).abs() < f64::EPSILON
            && area > 0.5 * tile_area * grid.tiles() as f64
        {
            best = grid;
        }
    }
    best
}

pub fn select_grid(width: u32, height: u32, config: &TilingConfig) -> Result<TilingGrid> {
    let candidates = candidate_grids(config)?;
    if width == 0 || height == 0 {
        return Err(AdapterError::InvalidImage(format!(
            "image has zero dimension ({width}x{height})"
        )));
    }
    let aspect_ratio = width as f64 / height as f64;
    Ok(find_closest_aspect_ratio(
        aspect_ratio,
        &candidates,
        width,
        height,
        config.tile_size,
    ))
}

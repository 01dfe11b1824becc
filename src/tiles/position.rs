//! Tile addressing: single positions, fractional tile coordinates and
//! inclusive rectangles of tiles at one zoom level.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of tiles along one axis of the pyramid at `zoom`
pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32.checked_shl(zoom as u32).unwrap_or(u32::MAX)
}

/// A tile at integer `(x, y)` on pyramid level `zoom`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePosition {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TilePosition {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// True when `x` and `y` lie inside `[0, 2^zoom)`
    pub fn is_valid(&self) -> bool {
        let max = tiles_per_axis(self.zoom);
        self.x < max && self.y < max
    }

    /// The tile one level up that covers this one
    pub fn parent(&self) -> Option<TilePosition> {
        if self.zoom == 0 {
            return None;
        }
        Some(TilePosition::new(self.x / 2, self.y / 2, self.zoom - 1))
    }

    /// The covering tile at a coarser level, or `None` if `zoom` is finer
    pub fn ancestor_at(&self, zoom: u8) -> Option<TilePosition> {
        if zoom > self.zoom {
            return None;
        }
        let shift = (self.zoom - zoom) as u32;
        Some(TilePosition::new(self.x >> shift, self.y >> shift, zoom))
    }

    /// The four tiles one level down, row-major
    pub fn children(&self) -> [TilePosition; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.zoom + 1);
        [
            TilePosition::new(x, y, z),
            TilePosition::new(x + 1, y, z),
            TilePosition::new(x, y + 1, z),
            TilePosition::new(x + 1, y + 1, z),
        ]
    }

    /// The single-tile range holding this position
    pub fn to_range(&self) -> TileRange {
        TileRange::new(self.x, self.x, self.y, self.y, self.zoom)
    }
}

impl fmt::Display for TilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Fractional tile coordinates; the integer part addresses the tile, the
/// fraction is the position inside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileXY {
    pub x: f64,
    pub y: f64,
    pub zoom: u8,
}

impl TileXY {
    pub fn new(x: f64, y: f64, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// The containing tile, clamped to the pyramid
    pub fn position(&self) -> TilePosition {
        let max = tiles_per_axis(self.zoom).saturating_sub(1) as f64;
        TilePosition::new(
            self.x.floor().clamp(0.0, max) as u32,
            self.y.floor().clamp(0.0, max) as u32,
            self.zoom,
        )
    }

    /// `(u, v)` offset inside the containing tile, each in `[0, 1)`
    pub fn sub_tile_offset(&self) -> (f64, f64) {
        (self.x - self.x.floor(), self.y - self.y.floor())
    }
}

/// Cache identity of a tile: the source partition plus its position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub source: String,
    pub position: TilePosition,
}

impl TileKey {
    pub fn new(source: impl Into<String>, position: TilePosition) -> Self {
        Self {
            source: source.into(),
            position,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.position)
    }
}

/// Inclusive rectangle of tiles on one zoom level.
///
/// `zoom == 0` is reserved for the empty range returned by
/// [`TileRange::empty`]; it has no tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRange {
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    pub zoom: u8,
}

impl TileRange {
    /// Creates a range; swapped bounds are put in order
    pub fn new(min_x: u32, max_x: u32, min_y: u32, max_y: u32, zoom: u8) -> Self {
        Self {
            min_x: min_x.min(max_x),
            max_x: min_x.max(max_x),
            min_y: min_y.min(max_y),
            max_y: min_y.max(max_y),
            zoom,
        }
    }

    pub fn empty() -> Self {
        Self {
            min_x: 0,
            max_x: 0,
            min_y: 0,
            max_y: 0,
            zoom: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.zoom == 0
    }

    /// Number of tiles in the range
    pub fn size(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let width = (self.max_x - self.min_x) as usize + 1;
        let height = (self.max_y - self.min_y) as usize + 1;
        width * height
    }

    /// Square root of the tile count, the range's "width" in tiles
    pub fn tiles_spanned(&self) -> f64 {
        (self.size() as f64).sqrt()
    }

    pub fn contains(&self, position: &TilePosition) -> bool {
        !self.is_empty()
            && position.zoom == self.zoom
            && (self.min_x..=self.max_x).contains(&position.x)
            && (self.min_y..=self.max_y).contains(&position.y)
    }

    /// The same area expressed at another zoom level
    pub fn at_zoom(&self, zoom: u8) -> TileRange {
        if self.is_empty() || zoom == 0 {
            return TileRange::empty();
        }
        if zoom >= self.zoom {
            let shift = (zoom - self.zoom) as u32;
            let limit = tiles_per_axis(zoom).saturating_sub(1);
            let scale = |v: u32| v.checked_shl(shift).unwrap_or(u32::MAX).min(limit);
            let scale_max = |v: u32| {
                (v as u64 + 1)
                    .checked_shl(shift)
                    .map(|s| (s - 1).min(limit as u64) as u32)
                    .unwrap_or(limit)
            };
            TileRange::new(
                scale(self.min_x),
                scale_max(self.max_x),
                scale(self.min_y),
                scale_max(self.max_y),
                zoom,
            )
        } else {
            let shift = (self.zoom - zoom) as u32;
            TileRange::new(
                self.min_x >> shift,
                self.max_x >> shift,
                self.min_y >> shift,
                self.max_y >> shift,
                zoom,
            )
        }
    }

    /// All positions, row by row
    pub fn tile_positions(&self) -> Vec<TilePosition> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut positions = Vec::with_capacity(self.size());
        for y in self.min_y..=self.max_y {
            for x in self.min_x..=self.max_x {
                positions.push(TilePosition::new(x, y, self.zoom));
            }
        }
        positions
    }

    /// All positions ordered by Manhattan distance from the centre of the
    /// range; ties keep row-major order.
    pub fn tile_positions_sorted(&self) -> Vec<TilePosition> {
        let mut positions = self.tile_positions();
        // Doubled coordinates keep the half-tile centre integral.
        let cx = self.min_x as i64 + self.max_x as i64;
        let cy = self.min_y as i64 + self.max_y as i64;
        positions.sort_by_key(|p| (2 * p.x as i64 - cx).abs() + (2 * p.y as i64 - cy).abs());
        positions
    }
}

impl fmt::Display for TileRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "TileRange(empty)");
        }
        write!(
            f,
            "TileRange(z{} x{}..={} y{}..={})",
            self.zoom, self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

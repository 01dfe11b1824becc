//! Engine-wide tuning constants.
//! Keeping them in a single place makes the zoom and loading heuristics easy to find.

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// A range spanning more tiles than this (per side) is never fetched.
pub const MAX_TILES_SPANNED: f64 = 20.0;

/// Hard ceiling on tiles drawn per frame, independent of screen size.
pub const MAX_TILES_PER_FRAME: usize = 500;

/// Multiplier on the visible tile count when sizing the cache, leaving room
/// for neighbouring zoom levels and partially visible tiles.
pub const CACHE_SIZE_MULTIPLIER: f64 = 4.0;

/// Bytes per decoded RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Zoom offsets searched, in order, when a tile at the display zoom level is
/// not loaded yet.
pub const FALLBACK_ZOOM_OFFSETS: [i32; 7] = [1, 2, -1, -2, -3, -4, -5];

/// Lowest zoom level a layer can display; zoom 0 marks an empty tile range.
pub const MIN_DISPLAY_ZOOM: u8 = 1;

/// Default lower zoom bound for new layers.
pub const DEFAULT_MIN_ZOOM: u8 = 2;

/// Default upper zoom bound for new layers.
pub const DEFAULT_MAX_ZOOM: u8 = 20;

/// Areas below this are treated as degenerate in scale computations.
pub const AREA_EPSILON: f64 = 1e-9;

/// Determinants below this make an affine solve degenerate.
pub const DETERMINANT_EPSILON: f64 = 1e-9;

/// Slack, in tile units, absorbed when snapping view corners to tile borders.
pub const TILE_EDGE_EPSILON: f64 = 1e-6;

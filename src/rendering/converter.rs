//! Conversions between geographic, projected, tile and screen space for one
//! frame.

use crate::core::bounds::Bounds;
use crate::core::constants::{AREA_EPSILON, TILE_EDGE_EPSILON};
use crate::core::geo::{EastNorth, LatLng, LatLngBounds, Point};
use crate::core::viewport::Viewport;
use crate::prelude::Arc;
use crate::rendering::transform::AffineTransform;
use crate::tiles::position::{tiles_per_axis, TilePosition, TileRange, TileXY};
use crate::tiles::source::TileSource;

/// Geometry of a tile source against the current view.
///
/// Built once per frame; holds no state besides the view parameters.
#[derive(Clone)]
pub struct CoordinateConverter {
    viewport: Viewport,
    source: Arc<dyn TileSource>,
    displacement: EastNorth,
    zoom_offset: i32,
}

impl CoordinateConverter {
    pub fn new(
        viewport: &Viewport,
        source: Arc<dyn TileSource>,
        displacement: EastNorth,
        zoom_offset: i32,
    ) -> Self {
        Self {
            viewport: viewport.clone(),
            source,
            displacement,
            zoom_offset,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    pub fn tile_size(&self) -> u32 {
        self.source.tile_size().max(1)
    }

    /// Projected position of fractional tile coordinates, displacement applied
    pub fn tile_xy_to_east_north(&self, xy: &TileXY) -> EastNorth {
        let lat_lng = self.source.tile_xy_to_lat_lng(xy);
        self.viewport.projection.project(&lat_lng) + self.displacement
    }

    /// Fractional tile coordinates of a projected position
    pub fn east_north_to_tile_xy(&self, en: &EastNorth, zoom: u8) -> TileXY {
        let lat_lng = self.unshift(en);
        self.source.lat_lng_to_tile_xy(&lat_lng, zoom)
    }

    pub fn tile_to_screen(&self, xy: &TileXY) -> Point {
        self.viewport
            .east_north_to_screen(&self.tile_xy_to_east_north(xy))
    }

    pub fn screen_to_tile(&self, point: &Point, zoom: u8) -> TileXY {
        let en = self.viewport.screen_to_east_north(point);
        self.east_north_to_tile_xy(&en, zoom)
    }

    /// Screen rectangle covered by a tile
    pub fn tile_screen_rect(&self, position: &TilePosition) -> Bounds {
        let (x, y) = (position.x as f64, position.y as f64);
        Bounds::from_points(&[
            self.tile_to_screen(&TileXY::new(x, y, position.zoom)),
            self.tile_to_screen(&TileXY::new(x + 1.0, y + 1.0, position.zoom)),
        ])
    }

    fn unshift(&self, en: &EastNorth) -> LatLng {
        self.viewport.projection.unproject(&(*en - self.displacement))
    }

    /// Geographic bounds of the view with the layer displacement removed
    fn view_lat_lng_bounds(&self) -> LatLngBounds {
        let top_left = self.viewport.screen_to_east_north(&Point::new(0.0, 0.0));
        let bottom_right = self
            .viewport
            .screen_to_east_north(&Point::new(self.viewport.width(), self.viewport.height()));

        let a = self.unshift(&top_left);
        let b = self.unshift(&bottom_right);
        LatLngBounds::from_coords(a.lat.min(b.lat), a.lng.min(b.lng), a.lat.max(b.lat), a.lng.max(b.lng))
    }

    /// Tiles at `zoom` covering the view; the empty range when the view does
    /// not overlap the source's world bounds
    pub fn tile_range_for_view(&self, zoom: u8) -> TileRange {
        if zoom == 0 || self.viewport.is_degenerate() {
            return TileRange::empty();
        }
        let Some(visible) = self.view_lat_lng_bounds().intersection(&self.source.world_bounds()) else {
            return TileRange::empty();
        };

        let nw = self.source.lat_lng_to_tile_xy(&visible.north_west(), zoom);
        let se = self.source.lat_lng_to_tile_xy(&visible.south_east(), zoom);

        let limit = tiles_per_axis(zoom).saturating_sub(1) as f64;
        let snap_min = |v: f64| (v + TILE_EDGE_EPSILON).floor().clamp(0.0, limit);
        let snap_max = |v: f64| ((v - TILE_EDGE_EPSILON).ceil() - 1.0).clamp(0.0, limit);

        let min_x = snap_min(nw.x.min(se.x));
        let min_y = snap_min(nw.y.min(se.y));
        let max_x = snap_max(nw.x.max(se.x)).max(min_x);
        let max_y = snap_max(nw.y.max(se.y)).max(min_y);

        TileRange::new(min_x as u32, max_x as u32, min_y as u32, max_y as u32, zoom)
    }

    /// Screen pixels per tile pixel covering the view at `zoom`, as an area
    /// ratio; 1.0 when either area is degenerate
    pub fn scale_factor(&self, zoom: u8) -> f64 {
        let screen_area = self.viewport.width() * self.viewport.height();

        let top_left = self.viewport.screen_to_east_north(&Point::new(0.0, 0.0));
        let bottom_right = self
            .viewport
            .screen_to_east_north(&Point::new(self.viewport.width(), self.viewport.height()));
        let a = self.east_north_to_tile_xy(&top_left, zoom);
        let b = self.east_north_to_tile_xy(&bottom_right, zoom);

        let ts = self.tile_size() as f64;
        let tile_area = ((b.x - a.x) * ts).abs() * ((b.y - a.y) * ts).abs();

        if !(screen_area >= AREA_EPSILON) || !(tile_area >= AREA_EPSILON) {
            return 1.0;
        }
        screen_area / tile_area
    }

    /// Zoom level whose tile resolution best matches the screen, biased by
    /// the zoom offset; not clamped
    pub fn best_zoom(&self) -> i32 {
        let factor = self.scale_factor(1);
        let zoom = factor.log2() / 2.0 + 1.0 + self.zoom_offset as f64;
        if !zoom.is_finite() {
            return 1 + self.zoom_offset;
        }
        zoom.round() as i32
    }

    /// Maps tile-local `[0, 1]²` onto screen pixels; the identity when the
    /// tile collapses on screen
    pub fn pixel_transform(&self, position: &TilePosition) -> AffineTransform {
        let (x, y, z) = (position.x as f64, position.y as f64, position.zoom);
        let unit = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        let screen = [
            self.tile_to_screen(&TileXY::new(x, y, z)),
            self.tile_to_screen(&TileXY::new(x + 1.0, y, z)),
            self.tile_to_screen(&TileXY::new(x, y + 1.0, z)),
        ];

        match AffineTransform::from_points(unit, screen) {
            Some(transform) if !transform.is_degenerate() => transform,
            _ => AffineTransform::identity(),
        }
    }
}

impl std::fmt::Debug for CoordinateConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateConverter")
            .field("viewport", &self.viewport)
            .field("source", &self.source.name())
            .field("displacement", &self.displacement)
            .field("zoom_offset", &self.zoom_offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::Projection;
    use crate::tiles::source::TmsSource;

    fn source() -> Arc<dyn TileSource> {
        Arc::new(TmsSource::new("test", "https://t/{z}/{x}/{y}.png"))
    }

    /// 512x512 view whose centre is the shared corner of tiles
    /// (512..=513, 340..=341) at zoom 10
    fn two_by_two() -> Viewport {
        let corner = source().tile_xy_to_lat_lng(&TileXY::new(513.0, 341.0, 10));
        Viewport::for_zoom(corner, 10.0, Point::new(512.0, 512.0))
    }

    #[test]
    fn test_range_for_two_by_two_view() {
        let converter = CoordinateConverter::new(&two_by_two(), source(), EastNorth::default(), 0);

        assert_eq!(converter.best_zoom(), 10);
        assert_eq!(converter.tile_range_for_view(10), TileRange::new(512, 513, 340, 341, 10));
    }

    #[test]
    fn test_zoom_offset_biases_best_zoom() {
        let converter = CoordinateConverter::new(&two_by_two(), source(), EastNorth::default(), 2);
        assert_eq!(converter.best_zoom(), 12);
    }

    #[test]
    fn test_scale_factor_quadruples_per_level() {
        let converter = CoordinateConverter::new(&two_by_two(), source(), EastNorth::default(), 0);
        let ratio = converter.scale_factor(4) / converter.scale_factor(5);
        assert!((ratio - 4.0).abs() < 1e-6);
        assert!((converter.scale_factor(10) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_view() {
        let mut viewport = two_by_two();
        viewport.set_size(Point::new(0.0, 0.0));
        let converter = CoordinateConverter::new(&viewport, source(), EastNorth::default(), 0);

        assert_eq!(converter.scale_factor(5), 1.0);
        assert!(converter.tile_range_for_view(10).is_empty());
    }

    #[test]
    fn test_view_outside_world_is_empty() {
        let viewport = Viewport::from_east_north(
            EastNorth::new(0.0, 1.0e9),
            10.0,
            Point::new(256.0, 256.0),
            Projection::WebMercator,
        );
        let converter = CoordinateConverter::new(&viewport, source(), EastNorth::default(), 0);
        assert!(converter.tile_range_for_view(8).is_empty());
    }

    #[test]
    fn test_pixel_transform_round_trip() {
        let converter = CoordinateConverter::new(&two_by_two(), source(), EastNorth::default(), 0);
        let tile = TilePosition::new(512, 340, 10);
        let transform = converter.pixel_transform(&tile);

        let top_left = converter.tile_to_screen(&TileXY::new(512.0, 340.0, 10));
        let bottom_right = converter.tile_to_screen(&TileXY::new(513.0, 341.0, 10));
        let mapped_tl = transform.apply(&Point::new(0.0, 0.0));
        let mapped_br = transform.apply(&Point::new(1.0, 1.0));

        assert!((mapped_tl.x - top_left.x).abs() < 1e-6 && (mapped_tl.y - top_left.y).abs() < 1e-6);
        assert!((mapped_br.x - bottom_right.x).abs() < 1e-6 && (mapped_br.y - bottom_right.y).abs() < 1e-6);
        assert!((mapped_tl.x).abs() < 1e-6 && (mapped_tl.y).abs() < 1e-6);
        assert!((mapped_br.x - 256.0).abs() < 1e-6 && (mapped_br.y - 256.0).abs() < 1e-6);
    }

    #[test]
    fn test_displacement_shifts_tiles() {
        let shifted = CoordinateConverter::new(&two_by_two(), source(), EastNorth::new(100.0, 0.0), 0);
        let plain = CoordinateConverter::new(&two_by_two(), source(), EastNorth::default(), 0);
        let tile = TileXY::new(512.0, 340.0, 10);

        let dx = shifted.tile_to_screen(&tile).x - plain.tile_to_screen(&tile).x;
        let scale = two_by_two().scale;
        assert!((dx - 100.0 / scale).abs() < 1e-6);
    }
}

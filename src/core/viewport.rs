use crate::core::geo::{EastNorth, LatLng, LatLngBounds, Point};
use crate::core::projection::Projection;
use serde::{Deserialize, Serialize};

/// The view state a tile layer is painted into: screen size, projection,
/// the projected centre and the scale in metres per pixel.
///
/// Read-only from the tile engine's perspective; the surrounding
/// application pans and zooms it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// The center of the map view in projected coordinates
    pub center: EastNorth,
    /// Metres per screen pixel
    pub scale: f64,
    /// The size of the viewport in pixels
    pub size: Point,
    pub projection: Projection,
}

impl Viewport {
    /// Creates a new viewport centred on a geographical coordinate
    pub fn new(center: LatLng, scale: f64, size: Point, projection: Projection) -> Self {
        Self {
            center: projection.project(&center),
            scale,
            size,
            projection,
        }
    }

    /// Creates a Web Mercator viewport whose resolution matches a 256 px
    /// tile pyramid at a (possibly fractional) zoom level
    pub fn for_zoom(center: LatLng, zoom: f64, size: Point) -> Self {
        let projection = Projection::WebMercator;
        Self::new(center, projection.scale_for_zoom(zoom), size, projection)
    }

    /// Creates a viewport from an already projected centre
    pub fn from_east_north(center: EastNorth, scale: f64, size: Point, projection: Projection) -> Self {
        Self {
            center,
            scale,
            size,
            projection,
        }
    }

    /// Sets the center of the viewport
    pub fn set_center(&mut self, center: LatLng) {
        self.center = self.projection.project(&center);
    }

    /// Sets the viewport size
    pub fn set_size(&mut self, size: Point) {
        self.size = size;
    }

    /// Zooms in (`factor < 1`) or out (`factor > 1`) around the centre
    pub fn zoom_by(&mut self, factor: f64) {
        if factor > 0.0 && factor.is_finite() {
            self.scale *= factor;
        }
    }

    /// Pans the viewport by the given pixel offset
    pub fn pan(&mut self, delta: Point) {
        self.center = EastNorth::new(
            self.center.east + delta.x * self.scale,
            self.center.north - delta.y * self.scale,
        );
    }

    pub fn width(&self) -> f64 {
        self.size.x
    }

    pub fn height(&self) -> f64 {
        self.size.y
    }

    /// Converts projected coordinates to screen pixel coordinates
    pub fn east_north_to_screen(&self, en: &EastNorth) -> Point {
        Point::new(
            self.size.x / 2.0 + (en.east - self.center.east) / self.scale,
            self.size.y / 2.0 - (en.north - self.center.north) / self.scale,
        )
    }

    /// Converts screen pixel coordinates to projected coordinates
    pub fn screen_to_east_north(&self, point: &Point) -> EastNorth {
        EastNorth::new(
            self.center.east + (point.x - self.size.x / 2.0) * self.scale,
            self.center.north - (point.y - self.size.y / 2.0) * self.scale,
        )
    }

    /// Converts a geographical coordinate to screen pixel coordinates
    pub fn lat_lng_to_screen(&self, lat_lng: &LatLng) -> Point {
        self.east_north_to_screen(&self.projection.project(lat_lng))
    }

    /// Converts screen pixel coordinates back to geographical coordinates
    pub fn screen_to_lat_lng(&self, point: &Point) -> LatLng {
        self.projection.unproject(&self.screen_to_east_north(point))
    }

    /// Gets the current viewport bounds in geographical coordinates
    pub fn bounds(&self) -> LatLngBounds {
        let nw = self.screen_to_lat_lng(&Point::new(0.0, 0.0));
        let se = self.screen_to_lat_lng(&Point::new(self.size.x, self.size.y));

        LatLngBounds::from_coords(
            se.lat.min(nw.lat),
            nw.lng.min(se.lng),
            se.lat.max(nw.lat),
            nw.lng.max(se.lng),
        )
    }

    /// Returns true when the viewport has no drawable area
    pub fn is_degenerate(&self) -> bool {
        self.size.x < 1.0 || self.size.y < 1.0 || !(self.scale > 0.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::for_zoom(LatLng::new(0.0, 0.0), 2.0, Point::new(800.0, 600.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_round_trip() {
        let viewport = Viewport::for_zoom(LatLng::new(40.7128, -74.0060), 10.0, Point::new(800.0, 600.0));

        let pixel = Point::new(123.0, 456.0);
        let back = viewport.lat_lng_to_screen(&viewport.screen_to_lat_lng(&pixel));

        assert!((back.x - pixel.x).abs() < 1e-6);
        assert!((back.y - pixel.y).abs() < 1e-6);
    }

    #[test]
    fn test_center_maps_to_screen_middle() {
        let center = LatLng::new(51.5, -0.12);
        let viewport = Viewport::for_zoom(center, 12.0, Point::new(640.0, 480.0));

        let pixel = viewport.lat_lng_to_screen(&center);
        assert!((pixel.x - 320.0).abs() < 1e-6);
        assert!((pixel.y - 240.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounds_orientation() {
        let viewport = Viewport::for_zoom(LatLng::new(10.0, 10.0), 8.0, Point::new(512.0, 512.0));
        let bounds = viewport.bounds();

        assert!(bounds.north_east.lat > bounds.south_west.lat);
        assert!(bounds.north_east.lng > bounds.south_west.lng);
        assert!(bounds.contains(&LatLng::new(10.0, 10.0)));
    }

    #[test]
    fn test_pan_moves_center() {
        let mut viewport = Viewport::default();
        let before = viewport.center;
        viewport.pan(Point::new(10.0, -10.0));

        assert!(viewport.center.east > before.east);
        assert!(viewport.center.north > before.north);
    }
}

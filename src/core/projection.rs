//! Map projections offered by the view state.
//!
//! Tile pyramids are always addressed in Web Mercator; the view may use a
//! different projection, in which case tiles are warped onto the screen by
//! the per-tile affine transform.

use crate::core::geo::{EastNorth, LatLng, EARTH_RADIUS};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Projection {
    /// Spherical Web Mercator (EPSG:3857)
    #[default]
    WebMercator,
    /// Equidistant cylindrical projection in metres (EPSG:4087)
    Equirectangular,
}

impl Projection {
    pub fn code(&self) -> &'static str {
        match self {
            Projection::WebMercator => "EPSG:3857",
            Projection::Equirectangular => "EPSG:4087",
        }
    }

    pub fn project(&self, lat_lng: &LatLng) -> EastNorth {
        match self {
            Projection::WebMercator => lat_lng.to_mercator(),
            Projection::Equirectangular => EastNorth::new(
                lat_lng.lng.to_radians() * EARTH_RADIUS,
                lat_lng.lat.to_radians() * EARTH_RADIUS,
            ),
        }
    }

    pub fn unproject(&self, en: &EastNorth) -> LatLng {
        match self {
            Projection::WebMercator => LatLng::from_mercator(*en),
            Projection::Equirectangular => LatLng::new(
                (en.north / EARTH_RADIUS).to_degrees(),
                (en.east / EARTH_RADIUS).to_degrees(),
            ),
        }
    }

    /// Metres per pixel at the equator for a 256 px tile pyramid at `zoom`
    pub fn scale_for_zoom(&self, zoom: f64) -> f64 {
        2.0 * std::f64::consts::PI * EARTH_RADIUS / (256.0 * 2_f64.powf(zoom))
    }
}

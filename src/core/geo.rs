use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;
use std::ops::{Add, Mul, Sub};

/// Semi-major axis of WGS84, in metres
pub const EARTH_RADIUS: f64 = 6_378_137.0;
/// Latitude at which the Web-Mercator square ends
pub const MAX_LATITUDE: f64 = 85.051_128_779_8;

/// Geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// EPSG:3857 metres; latitudes beyond the Mercator square are clamped
    pub fn to_mercator(&self) -> EastNorth {
        let phi = Self::clamp_lat(self.lat).to_radians();
        EastNorth {
            east: EARTH_RADIUS * self.lng.to_radians(),
            north: EARTH_RADIUS * (FRAC_PI_4 + phi / 2.0).tan().ln(),
        }
    }

    pub fn from_mercator(en: EastNorth) -> Self {
        let phi = 2.0 * (en.north / EARTH_RADIUS).exp().atan() - 2.0 * FRAC_PI_4;
        Self {
            lat: phi.to_degrees(),
            lng: (en.east / EARTH_RADIUS).to_degrees(),
        }
    }
}

/// Projected coordinate in metres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EastNorth {
    pub east: f64,
    pub north: f64,
}

impl EastNorth {
    pub fn new(east: f64, north: f64) -> Self {
        Self { east, north }
    }

    pub fn is_zero(&self) -> bool {
        self.east == 0.0 && self.north == 0.0
    }
}

impl Add for EastNorth {
    type Output = EastNorth;

    fn add(self, rhs: EastNorth) -> EastNorth {
        EastNorth::new(self.east + rhs.east, self.north + rhs.north)
    }
}

impl Sub for EastNorth {
    type Output = EastNorth;

    fn sub(self, rhs: EastNorth) -> EastNorth {
        EastNorth::new(self.east - rhs.east, self.north - rhs.north)
    }
}

/// Screen position in pixels, y growing downwards
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

/// Lat/lng rectangle given by its south-west and north-east corners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl LatLngBounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    pub fn from_coords(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self::new(LatLng::new(south, west), LatLng::new(north, east))
    }

    pub fn mercator_world() -> Self {
        Self::from_coords(-MAX_LATITUDE, -180.0, MAX_LATITUDE, 180.0)
    }

    pub fn north_west(&self) -> LatLng {
        LatLng::new(self.north_east.lat, self.south_west.lng)
    }

    pub fn south_east(&self) -> LatLng {
        LatLng::new(self.south_west.lat, self.north_east.lng)
    }

    pub fn contains(&self, ll: &LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&ll.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&ll.lng)
    }

    /// Overlap of two rectangles; `None` when they share no area
    pub fn intersection(&self, other: &LatLngBounds) -> Option<LatLngBounds> {
        let south = self.south_west.lat.max(other.south_west.lat);
        let west = self.south_west.lng.max(other.south_west.lng);
        let north = self.north_east.lat.min(other.north_east.lat);
        let east = self.north_east.lng.min(other.north_east.lng);
        (south < north && west < east).then(|| LatLngBounds::from_coords(south, west, north, east))
    }
}

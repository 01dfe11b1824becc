use crate::core::geo::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_coords(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        }
    }

    /// Inverted rectangle that any [`Bounds::extend`] call replaces
    pub fn empty() -> Self {
        Self::from_coords(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY)
    }

    /// Hull of `points`; empty when there are none
    pub fn from_points(points: &[Point]) -> Self {
        points.iter().fold(Self::empty(), |mut hull, p| {
            hull.extend(p);
            hull
        })
    }

    pub fn extend(&mut self, p: &Point) {
        self.min = Point::new(self.min.x.min(p.x), self.min.y.min(p.y));
        self.max = Point::new(self.max.x.max(p.x), self.max.y.max(p.y));
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        (self.min + self.max) * 0.5
    }

    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// Edges count as inside
    pub fn contains(&self, p: &Point) -> bool {
        (self.min.x..=self.max.x).contains(&p.x) && (self.min.y..=self.max.y).contains(&p.y)
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        let overlap = Bounds::from_coords(
            self.min.x.max(other.min.x),
            self.min.y.max(other.min.y),
            self.max.x.min(other.max.x),
            self.max.y.min(other.max.y),
        );
        overlap.is_valid().then_some(overlap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hull_of_points() {
        let hull = Bounds::from_points(&[Point::new(10.0, 5.0), Point::new(-2.0, 8.0), Point::new(4.0, -1.0)]);

        assert_eq!(hull, Bounds::from_coords(-2.0, -1.0, 10.0, 8.0));
        assert_eq!(hull.center(), Point::new(4.0, 3.5));
        assert!(!Bounds::from_points(&[]).is_valid());
    }

    #[test]
    fn test_overlap() {
        let a = Bounds::from_coords(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::from_coords(5.0, 5.0, 15.0, 15.0);

        assert_eq!(a.intersection(&b), Some(Bounds::from_coords(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(a.intersection(&Bounds::from_coords(20.0, 20.0, 30.0, 30.0)), None);
        assert!(a.intersects(&Bounds::from_coords(10.0, 0.0, 12.0, 2.0)));
    }
}

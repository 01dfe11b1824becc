use crate::core::constants::DETERMINANT_EPSILON;
use crate::core::geo::Point;
use nalgebra::{Matrix3, Vector3};

/// 2D affine transform:
///
/// ```text
/// x' = m00 * x + m01 * y + m02
/// y' = m10 * x + m11 * y + m12
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m00: f64,
    pub m01: f64,
    pub m02: f64,
    pub m10: f64,
    pub m11: f64,
    pub m12: f64,
}

impl AffineTransform {
    pub fn new(m00: f64, m01: f64, m02: f64, m10: f64, m11: f64, m12: f64) -> Self {
        Self {
            m00,
            m01,
            m02,
            m10,
            m11,
            m12,
        }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::new(1.0, 0.0, dx, 0.0, 1.0, dy)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    /// The transform taking each `src[i]` onto `dst[i]`, or `None` when the
    /// source points are (nearly) collinear
    pub fn from_points(src: [Point; 3], dst: [Point; 3]) -> Option<Self> {
        let source = Matrix3::new(
            src[0].x, src[0].y, 1.0, //
            src[1].x, src[1].y, 1.0, //
            src[2].x, src[2].y, 1.0,
        );
        if source.determinant().abs() < DETERMINANT_EPSILON {
            return None;
        }
        let inverse = source.try_inverse()?;

        let xs = inverse * Vector3::new(dst[0].x, dst[1].x, dst[2].x);
        let ys = inverse * Vector3::new(dst[0].y, dst[1].y, dst[2].y);
        Some(Self::new(xs[0], xs[1], xs[2], ys[0], ys[1], ys[2]))
    }

    pub fn apply(&self, point: &Point) -> Point {
        Point::new(
            self.m00 * point.x + self.m01 * point.y + self.m02,
            self.m10 * point.x + self.m11 * point.y + self.m12,
        )
    }

    /// Determinant of the linear part
    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    pub fn is_degenerate(&self) -> bool {
        self.determinant().abs() < DETERMINANT_EPSILON
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// No rotation or shear
    pub fn is_axis_aligned(&self) -> bool {
        self.m01 == 0.0 && self.m10 == 0.0
    }

    pub fn inverse(&self) -> Option<Self> {
        let inverse = self.to_matrix().try_inverse()?;
        Some(Self::new(
            inverse[(0, 0)],
            inverse[(0, 1)],
            inverse[(0, 2)],
            inverse[(1, 0)],
            inverse[(1, 1)],
            inverse[(1, 2)],
        ))
    }

    /// `other` applied after `self`
    pub fn then(&self, other: &AffineTransform) -> Self {
        let m = other.to_matrix() * self.to_matrix();
        Self::new(m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(1, 0)], m[(1, 1)], m[(1, 2)])
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.m00, self.m01, self.m02, //
            self.m10, self.m11, self.m12, //
            0.0, 0.0, 1.0,
        )
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn test_from_points_maps_samples() {
        let src = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        let dst = [Point::new(10.0, 20.0), Point::new(266.0, 20.0), Point::new(10.0, 276.0)];
        let transform = AffineTransform::from_points(src, dst).unwrap();

        for (s, d) in src.iter().zip(dst.iter()) {
            assert!(close(transform.apply(s), *d));
        }
        assert!(close(transform.apply(&Point::new(1.0, 1.0)), Point::new(266.0, 276.0)));
        assert!(transform.is_axis_aligned());
    }

    #[test]
    fn test_collinear_source_is_rejected() {
        let src = [Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        let dst = [Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        assert!(AffineTransform::from_points(src, dst).is_none());
    }

    #[test]
    fn test_inverse_and_compose() {
        let transform = AffineTransform::scale(2.0, 3.0).then(&AffineTransform::translation(5.0, -1.0));
        let point = Point::new(4.0, 7.0);
        let mapped = transform.apply(&point);

        assert!(close(mapped, Point::new(13.0, 20.0)));
        assert!(close(transform.inverse().unwrap().apply(&mapped), point));
        assert!(AffineTransform::scale(0.0, 1.0).inverse().is_none());
    }
}

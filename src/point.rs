//! 2-D point value shared by the record store, every index, and the SQL parser.

use crate::error::{RelError, RelResult};
use std::cmp::Ordering;
use std::fmt;

/// A point in the plane. Coordinates are IEEE-754 doubles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Parses `"(x, y)"`, `"x, y"`, or `"x;y"`, with either `,` or `;` as separator
    /// and optional surrounding parentheses.
    pub fn parse(text: &str) -> RelResult<Self> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(trimmed);

        let sep = if inner.contains(';') { ';' } else { ',' };
        let mut parts = inner.splitn(2, sep);
        let x_str = parts.next().unwrap_or("").trim();
        let y_str = parts
            .next()
            .ok_or_else(|| RelError::Parse(format!("invalid point literal: '{text}'")))?
            .trim();

        let x: f64 = x_str
            .parse()
            .map_err(|_| RelError::Parse(format!("invalid point literal: '{text}'")))?;
        let y: f64 = y_str
            .parse()
            .map_err(|_| RelError::Parse(format!("invalid point literal: '{text}'")))?;

        Ok(Self { x, y })
    }

    pub fn to_tuple(self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn magnitude(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance_to_origin(self) -> f64 {
        self.magnitude()
    }

    pub fn distance_to(self, other: Point) -> f64 {
        (self - other).magnitude()
    }

    /// Zero vector normalizes to itself rather than dividing by zero.
    pub fn normalize(self) -> Self {
        let m = self.magnitude();
        if m == 0.0 {
            self
        } else {
            Self::new(self.x / m, self.y / m)
        }
    }

    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross_magnitude(self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn rotate(self, angle_rad: f64) -> Self {
        let (sin, cos) = angle_rad.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Inclusive on both bounds, componentwise.
    pub fn is_in_range(self, min: Point, max: Point) -> bool {
        self.x >= min.x && self.x <= max.x && self.y >= min.y && self.y <= max.y
    }

    /// Inclusive: points exactly `r` away count as inside.
    pub fn is_in_circle(self, center: Point, r: f64) -> bool {
        self.distance_to(center) <= r
    }

    pub fn checked_scalar_mul(self, s: f64) -> Self {
        Self::new(self.x * s, self.y * s)
    }

    pub fn checked_scalar_div(self, s: f64) -> RelResult<Self> {
        if s == 0.0 {
            return Err(RelError::Schema("cannot divide a point by zero".into()));
        }
        Ok(Self::new(self.x / s, self.y / s))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Points are totally ordered by distance to the origin so they can serve as AVL
/// keys. This is *not* the ordering used for `>`/`<` in SQL, which is componentwise
/// (see SPEC_FULL.md, Open Question (a)).
impl PartialOrd for Point {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.distance_to_origin().partial_cmp(&other.distance_to_origin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(Point::parse("(2, 3)").unwrap(), Point::new(2.0, 3.0));
        assert_eq!(Point::parse("2, 3").unwrap(), Point::new(2.0, 3.0));
        assert_eq!(Point::parse("2;3").unwrap(), Point::new(2.0, 3.0));
        assert_eq!(Point::parse(" ( -1.5 , 4 ) ").unwrap(), Point::new(-1.5, 4.0));
    }

    #[test]
    fn arithmetic() {
        let p = Point::new(3.0, 4.0);
        assert_eq!(p + Point::new(1.0, 1.0), Point::new(4.0, 5.0));
        assert_eq!(p.checked_scalar_mul(2.0), Point::new(6.0, 8.0));
        assert!(p.checked_scalar_div(0.0).is_err());
        assert_eq!(p.checked_scalar_div(2.0).unwrap(), Point::new(1.5, 2.0));
    }

    #[test]
    fn distance_and_magnitude() {
        let p = Point::new(3.0, 4.0);
        assert_eq!(p.distance_to_origin(), 5.0);
        assert_eq!(p.magnitude(), 5.0);
    }

    #[test]
    fn containment() {
        let p = Point::new(3.0, 4.0);
        assert!(p.is_in_range(Point::origin(), Point::new(5.0, 5.0)));
        assert!(Point::new(5.0, 5.0).is_in_range(Point::origin(), Point::new(5.0, 5.0)));
        assert!(!Point::new(6.0, 7.0).is_in_range(Point::origin(), Point::new(5.0, 5.0)));

        assert!(p.is_in_circle(Point::origin(), 6.0));
        assert!(!p.is_in_circle(Point::origin(), 4.0));
        assert!(p.is_in_circle(Point::origin(), 5.0));
    }

    #[test]
    fn rotate_normalize_dot_cross() {
        let p = Point::new(1.0, 0.0);
        let rotated = p.rotate(std::f64::consts::FRAC_PI_2);
        assert!((rotated.x - 0.0).abs() < 1e-10);
        assert!((rotated.y - 1.0).abs() < 1e-10);

        let zero = Point::origin();
        assert_eq!(zero.normalize(), zero);

        let n = Point::new(3.0, 4.0).normalize();
        assert!((n.magnitude() - 1.0).abs() < 1e-10);

        assert_eq!(Point::new(3.0, 4.0).dot(Point::new(1.0, 2.0)), 11.0);
        assert_eq!(Point::new(3.0, 4.0).cross_magnitude(Point::new(1.0, 2.0)), 2.0);
    }

    #[test]
    fn ordering_is_distance_to_origin() {
        let near = Point::new(1.0, 1.0);
        let far = Point::new(6.0, 8.0);
        assert!(near < far);
    }
}

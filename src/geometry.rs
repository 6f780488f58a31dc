//! Point geometry for the tree's entries and query surface.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::bounding_box::BoundingBox;

/// A 2D point with single-precision coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Creates a new point at the given coordinates.
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculates the Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// The degenerate bounding box covering exactly this point.
    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.x, self.y)
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT({} {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(b.distance(&a), 5.0);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_to_bbox() {
        let pt = Point::new(2.0, -3.0);
        let bbox = pt.to_bbox();
        assert_eq!(bbox, BoundingBox::new(2.0, -3.0, 2.0, -3.0));
        assert_eq!(bbox.area(), 0.0);
        assert!(bbox.contains_point(&pt));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Point::new(1.0, 2.5)), "POINT(1 2.5)");
    }
}

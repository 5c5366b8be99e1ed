//! Geometric primitives for page-region analysis.
//!
//! Coordinates are source-bitmap pixels.  Rectangles use inclusive corner
//! coordinates `(c1, r1)` - `(c2, r2)`, matching the row/column indexing used
//! throughout the segmentation algorithms.

/// An inclusive rectangle of source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left column (inclusive)
    pub c1: u32,
    /// Top row (inclusive)
    pub r1: u32,
    /// Right column (inclusive)
    pub c2: u32,
    /// Bottom row (inclusive)
    pub r2: u32,
}

impl PixelRect {
    /// Create a new rectangle.
    ///
    /// # Examples
    ///
    /// ```
    /// use rasterflow::geometry::PixelRect;
    ///
    /// let rect = PixelRect::new(0, 0, 99, 49);
    /// assert_eq!(rect.width(), 100);
    /// assert_eq!(rect.height(), 50);
    /// ```
    pub fn new(c1: u32, r1: u32, c2: u32, r2: u32) -> Self {
        debug_assert!(c1 <= c2 && r1 <= r2, "degenerate rect ({c1},{r1})-({c2},{r2})");
        Self { c1, r1, c2, r2 }
    }

    /// Width in pixels (inclusive extent).
    pub fn width(&self) -> u32 {
        self.c2 - self.c1 + 1
    }

    /// Height in pixels (inclusive extent).
    pub fn height(&self) -> u32 {
        self.r2 - self.r1 + 1
    }

    /// Width in inches at the given resolution.
    pub fn width_in(&self, dpi: u32) -> f64 {
        self.width() as f64 / dpi.max(1) as f64
    }

    /// Height in inches at the given resolution.
    pub fn height_in(&self, dpi: u32) -> f64 {
        self.height() as f64 / dpi.max(1) as f64
    }

    /// Horizontal midpoint column.
    pub fn mid_column(&self) -> u32 {
        self.c1 + self.width() / 2
    }

    /// Whether the rectangle covers no usable area after clamping.
    pub fn is_degenerate(&self) -> bool {
        self.c1 > self.c2 || self.r1 > self.r2
    }

    /// Check containment of another rectangle.
    pub fn contains(&self, other: &PixelRect) -> bool {
        self.c1 <= other.c1 && self.r1 <= other.r1 && self.c2 >= other.c2 && self.r2 >= other.r2
    }

    /// Check overlap with another rectangle.
    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.c1 <= other.c2 && other.c1 <= self.c2 && self.r1 <= other.r2 && other.r1 <= self.r2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extents_inclusive() {
        let rect = PixelRect::new(10, 20, 10, 20);
        assert_eq!(rect.width(), 1);
        assert_eq!(rect.height(), 1);
        assert!(!rect.is_degenerate());
    }

    #[test]
    fn test_inches() {
        let rect = PixelRect::new(0, 0, 299, 599);
        assert!((rect.width_in(300) - 1.0).abs() < 1e-9);
        assert!((rect.height_in(300) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_intersects_and_contains() {
        let a = PixelRect::new(0, 0, 100, 100);
        let b = PixelRect::new(50, 50, 150, 150);
        let c = PixelRect::new(101, 101, 120, 120);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.contains(&PixelRect::new(10, 10, 90, 90)));
        assert!(!a.contains(&b));
    }

    #[test]
    fn test_mid_column() {
        let rect = PixelRect::new(100, 0, 299, 10);
        assert_eq!(rect.mid_column(), 200);
    }
}

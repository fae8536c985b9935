//! Positions on a page or in a raster buffer.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in page units, origin at the top-left corner.
///
/// `y` grows downward, so `y0` is the top edge.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x0: f32,
    /// Top edge
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Bottom edge
    pub y1: f32,
}

impl BoundingBox {
    /// Create a box from two corners, in any order.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Center point.
    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Check whether a point lies inside, edges included.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// Rectangle over a raster buffer, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip the region to an image of the given size.
    ///
    /// Returns `None` when nothing of the region remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(Region::new(self.x, self.y, w, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_normalizes_corners() {
        let b = BoundingBox::new(10.0, 40.0, 2.0, 5.0);
        assert_eq!(b.x0, 2.0);
        assert_eq!(b.y0, 5.0);
        assert_eq!(b.width(), 8.0);
        assert_eq!(b.height(), 35.0);
        assert!(b.contains(6.0, 20.0));
        assert!(!b.contains(11.0, 20.0));
    }

    #[test]
    fn test_bbox_union() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 20.0, 30.0, 25.0);
        assert_eq!(a.union(&b), BoundingBox::new(0.0, 0.0, 30.0, 25.0));
    }

    #[test]
    fn test_region_clamp() {
        let r = Region::new(90, 90, 50, 50);
        assert_eq!(r.clamp_to(100, 120), Some(Region::new(90, 90, 10, 30)));
        assert_eq!(Region::new(100, 0, 5, 5).clamp_to(100, 100), None);
    }
}

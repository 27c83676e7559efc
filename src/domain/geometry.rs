//! Geometric types for mask regions and image coordinates

/// Pixel-space rectangle, half-open on the right and bottom edges
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Create a new rectangle from coordinates
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering a whole `width` x `height` image
    pub fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Build from an inclusive `[x1, y1, x2, y2]` bounding box
    pub fn from_bbox(bbox: &[f32; 4]) -> Option<Rect> {
        let [x1, y1, x2, y2] = *bbox;
        if !bbox.iter().all(|v| v.is_finite()) {
            return None;
        }
        let rect = Rect::new(
            x1.min(x2).floor() as i32,
            y1.min(y2).floor() as i32,
            x1.max(x2).floor() as i32 + 1,
            y1.max(y2).floor() as i32 + 1,
        );
        (!rect.is_empty()).then_some(rect)
    }

    /// Convert to an inclusive `[x1, y1, x2, y2]` bounding box
    pub fn to_bbox(&self) -> [f32; 4] {
        [
            self.left as f32,
            self.top as f32,
            (self.right - 1) as f32,
            (self.bottom - 1) as f32,
        ]
    }

    /// Calculate the intersection of two rectangles
    pub fn intersect(&self, other: Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        if left < right && top < bottom {
            Some(Rect {
                left,
                top,
                right,
                bottom,
            })
        } else {
            None
        }
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: Rect) -> Rect {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Get the width of the rectangle
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Get the height of the rectangle
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Check if this rectangle contains a point
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// A pointer position resolved to image pixel coordinates
///
/// `x`/`y` are always clamped into the image. `in_bounds` is false when the
/// pointer was outside the displayed image area.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImagePoint {
    pub x: u32,
    pub y: u32,
    pub in_bounds: bool,
}

impl ImagePoint {
    /// Point that hit-testing always treats as a miss
    pub const OUTSIDE: ImagePoint = ImagePoint {
        x: 0,
        y: 0,
        in_bounds: false,
    };

    pub fn inside(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            in_bounds: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_conversion_is_inclusive() {
        let rect = Rect::from_bbox(&[10.0, 20.0, 19.0, 29.0]).unwrap();
        assert_eq!(rect, Rect::new(10, 20, 20, 30));
        assert_eq!(rect.width(), 10);
        assert_eq!(rect.to_bbox(), [10.0, 20.0, 19.0, 29.0]);
    }

    #[test]
    fn test_bbox_rejects_non_finite() {
        assert!(Rect::from_bbox(&[0.0, f32::NAN, 4.0, 4.0]).is_none());
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = Rect::new(0, 0, 4, 4);
        assert_eq!(Rect::default().union(a), a);
        assert_eq!(a.union(Rect::new(2, 2, 8, 6)), Rect::new(0, 0, 8, 6));
    }

    #[test]
    fn test_intersect_disjoint() {
        let a = Rect::new(0, 0, 4, 4);
        assert!(a.intersect(Rect::new(4, 0, 8, 4)).is_none());
        assert!(a.contains_point(3, 3));
        assert!(!a.contains_point(4, 3));
    }
}

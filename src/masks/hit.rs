//! Point-to-mask resolution
//!
//! When several masks contain a point the one with the fewest pixels wins:
//! a small, local region is more likely what the user is pointing at than a
//! large background mask. Equal areas fall back to the lower id.

use super::index::{IndexedMask, MaskIndex};
use crate::domain::{ImagePoint, MaskId};

/// Offsets sampled by hover queries: the point and its four direct neighbours
const HOVER_SAMPLES: [(i32, i32); 5] = [(0, 0), (1, 0), (-1, 0), (0, 1), (0, -1)];

/// Hit-tester over one published mask index
#[derive(Debug, Clone, Copy)]
pub struct HitTester<'a> {
    index: &'a MaskIndex,
}

impl<'a> HitTester<'a> {
    pub fn new(index: &'a MaskIndex) -> Self {
        Self { index }
    }

    fn in_image(&self, x: i32, y: i32) -> bool {
        let (width, height) = self.index.dimensions();
        x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
    }

    #[inline]
    fn hits(mask: &IndexedMask, x: i32, y: i32) -> bool {
        match mask.pixels.bounds() {
            Some(bounds) => bounds.contains_point(x, y) && mask.pixels.contains(x, y),
            None => false,
        }
    }

    fn rank(mask: &IndexedMask) -> (u64, MaskId) {
        (mask.pixels.area(), mask.id)
    }

    /// Fold one sample point into the running best match
    fn best_at(&self, x: i32, y: i32, best: &mut Option<&'a IndexedMask>) {
        for mask in self.index.iter() {
            if !Self::hits(mask, x, y) {
                continue;
            }
            let better = match best {
                Some(current) => Self::rank(mask) < Self::rank(current),
                None => true,
            };
            if better {
                *best = Some(mask);
            }
        }
    }

    /// Best mask containing exactly this pixel
    pub fn query(&self, x: i32, y: i32) -> Option<MaskId> {
        if !self.in_image(x, y) {
            return None;
        }
        let mut best = None;
        self.best_at(x, y, &mut best);
        best.map(|m| m.id)
    }

    /// Best mask across the pixel and its direct neighbours
    ///
    /// Absorbs one pixel of jitter from the pointer mapping near mask edges.
    pub fn query_hover(&self, x: i32, y: i32) -> Option<MaskId> {
        if !self.in_image(x, y) {
            return None;
        }
        let mut best = None;
        for (dx, dy) in HOVER_SAMPLES {
            let (sx, sy) = (x + dx, y + dy);
            if self.in_image(sx, sy) {
                self.best_at(sx, sy, &mut best);
            }
        }
        best.map(|m| m.id)
    }

    /// Query a mapped pointer position; out-of-bounds points never hit
    pub fn query_point(&self, point: ImagePoint, neighborhood: bool) -> Option<MaskId> {
        if !point.in_bounds {
            return None;
        }
        let (x, y) = (point.x as i32, point.y as i32);
        if neighborhood {
            self.query_hover(x, y)
        } else {
            self.query(x, y)
        }
    }

    /// Every mask containing the pixel, smallest first
    pub fn candidates(&self, x: i32, y: i32) -> Vec<MaskId> {
        if !self.in_image(x, y) {
            return Vec::new();
        }
        let mut hits: Vec<&IndexedMask> = self
            .index
            .iter()
            .filter(|mask| Self::hits(mask, x, y))
            .collect();
        hits.sort_by_key(|mask| Self::rank(mask));
        hits.into_iter().map(|m| m.id).collect()
    }
}

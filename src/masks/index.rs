//! Per-mask membership bitsets and the batch index built from them

use std::collections::HashMap;
use std::sync::Arc;

use image::{GrayImage, Luma};

use crate::domain::{Mask, MaskId, Rect};

/// Constant-time "is (x, y) inside this mask" lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelIndex {
    width: u32,
    height: u32,
    bits: Vec<u64>,
    area: u64,
    bounds: Option<Rect>,
    /// Bounding box of every pixel with nonzero intensity
    extent: Option<Rect>,
}

impl PixelIndex {
    /// Build from an intensity plane; pixels strictly above `threshold` are members
    pub fn build(intensity: &GrayImage, threshold: u8) -> Self {
        let (width, height) = intensity.dimensions();
        let len = (width as usize) * (height as usize);
        let mut bits = vec![0u64; len.div_ceil(64)];
        let mut area = 0u64;
        let mut bounds = Rect::default();
        let mut extent = Rect::default();

        for (x, y, Luma([value])) in intensity.enumerate_pixels() {
            if *value == 0 {
                continue;
            }
            let pixel = Rect::new(x as i32, y as i32, x as i32 + 1, y as i32 + 1);
            extent = extent.union(pixel);
            if *value > threshold {
                let i = (y as usize) * (width as usize) + x as usize;
                bits[i / 64] |= 1u64 << (i % 64);
                area += 1;
                bounds = bounds.union(pixel);
            }
        }

        Self {
            width,
            height,
            bits,
            area,
            bounds: (!bounds.is_empty()).then_some(bounds),
            extent: (!extent.is_empty()).then_some(extent),
        }
    }

    /// Membership test; coordinates outside the plane are never members
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return false;
        }
        let i = (y as usize) * (self.width as usize) + x as usize;
        self.bits[i / 64] & (1u64 << (i % 64)) != 0
    }

    /// Number of member pixels
    pub fn area(&self) -> u64 {
        self.area
    }

    /// Tight bounding box of member pixels, None for an empty mask
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    /// Where the raw intensity is nonzero, members or not
    pub fn extent(&self) -> Option<Rect> {
        self.extent
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A decoded, indexed mask of the current batch
#[derive(Debug, Clone)]
pub struct IndexedMask {
    pub id: MaskId,
    /// Position in the batch, used for palette cycling
    pub batch_index: usize,
    /// Raw intensity, sized to the session image
    pub intensity: Arc<GrayImage>,
    pub pixels: PixelIndex,
}

/// All indexed masks of one batch, published as a unit
#[derive(Debug, Clone, Default)]
pub struct MaskIndex {
    width: u32,
    height: u32,
    masks: Vec<IndexedMask>,
    by_id: HashMap<MaskId, usize>,
}

impl MaskIndex {
    /// Empty index for an image of the given size
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Assemble an index from already-built masks, ordered by batch position
    pub fn from_masks(width: u32, height: u32, mut masks: Vec<IndexedMask>) -> Self {
        masks.sort_by_key(|m| m.batch_index);
        let by_id = masks
            .iter()
            .enumerate()
            .map(|(slot, m)| (m.id, slot))
            .collect();
        Self {
            width,
            height,
            masks,
            by_id,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, id: MaskId) -> Option<&IndexedMask> {
        self.by_id.get(&id).map(|&slot| &self.masks[slot])
    }

    pub fn contains_id(&self, id: MaskId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedMask> {
        self.masks.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = MaskId> + '_ {
        self.masks.iter().map(|m| m.id)
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Bounding box for a mask: the record's bbox if given, else the derived one
    pub fn bbox(&self, mask: &Mask) -> Option<[f32; 4]> {
        mask.bbox
            .or_else(|| self.get(mask.id)?.pixels.bounds().map(|r| r.to_bbox()))
    }

    /// Union of the given masks as a binary 0/255 plane; unknown ids are ignored
    pub fn union(&self, ids: impl IntoIterator<Item = MaskId>) -> GrayImage {
        let mut out = GrayImage::new(self.width, self.height);
        for mask in ids.into_iter().filter_map(|id| self.get(id)) {
            let Some(bounds) = mask.pixels.bounds() else {
                continue;
            };
            for y in bounds.top..bounds.bottom {
                for x in bounds.left..bounds.right {
                    if mask.pixels.contains(x, y) {
                        out.put_pixel(x as u32, y as u32, Luma([255]));
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Intensity plane with a filled rectangle of the given value
    pub(crate) fn rect_plane(width: u32, height: u32, rect: Rect, value: u8) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if rect.contains_point(x as i32, y as i32) {
                Luma([value])
            } else {
                Luma([0])
            }
        })
    }

    pub(crate) fn indexed(id: u32, batch_index: usize, plane: GrayImage) -> IndexedMask {
        let pixels = PixelIndex::build(&plane, 128);
        IndexedMask {
            id: MaskId(id),
            batch_index,
            intensity: Arc::new(plane),
            pixels,
        }
    }

    #[test]
    fn test_build_counts_area_and_bounds() {
        let plane = rect_plane(100, 100, Rect::new(10, 20, 30, 25), 255);
        let index = PixelIndex::build(&plane, 128);
        assert_eq!(index.area(), 100);
        assert_eq!(index.bounds(), Some(Rect::new(10, 20, 30, 25)));
        assert!(index.contains(10, 20));
        assert!(index.contains(29, 24));
        assert!(!index.contains(30, 24));
        assert!(!index.contains(-1, 20));
        assert!(!index.contains(10, 100));
    }

    #[test]
    fn test_threshold_is_strict() {
        let plane = rect_plane(8, 8, Rect::new(0, 0, 4, 4), 128);
        let index = PixelIndex::build(&plane, 128);
        assert_eq!(index.area(), 0);
        assert_eq!(index.bounds(), None);
        assert_eq!(index.extent(), Some(Rect::new(0, 0, 4, 4)));

        let plane = rect_plane(8, 8, Rect::new(0, 0, 4, 4), 129);
        assert_eq!(PixelIndex::build(&plane, 128).area(), 16);
    }

    #[test]
    fn test_extent_covers_soft_edges() {
        let plane = GrayImage::from_fn(40, 40, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) {
                Luma([255])
            } else if x < 35 && y < 30 {
                Luma([100])
            } else {
                Luma([0])
            }
        });
        let index = PixelIndex::build(&plane, 128);
        assert_eq!(index.bounds(), Some(Rect::new(10, 10, 20, 20)));
        assert_eq!(index.extent(), Some(Rect::new(0, 0, 35, 30)));
        assert_eq!(PixelIndex::build(&GrayImage::new(4, 4), 128).extent(), None);
    }

    #[test]
    fn test_union_and_derived_bbox() {
        let index = MaskIndex::from_masks(
            20,
            20,
            vec![
                indexed(2, 1, rect_plane(20, 20, Rect::new(10, 10, 12, 12), 255)),
                indexed(1, 0, rect_plane(20, 20, Rect::new(0, 0, 2, 2), 255)),
            ],
        );
        assert_eq!(index.ids().collect::<Vec<_>>(), vec![MaskId(1), MaskId(2)]);

        let union = index.union([MaskId(1), MaskId(2), MaskId(99)]);
        assert_eq!(union.pixels().filter(|p| p.0[0] == 255).count(), 8);
        assert_eq!(union.get_pixel(11, 11).0[0], 255);
        assert_eq!(union.get_pixel(5, 5).0[0], 0);

        let mask = Mask::new(MaskId(2), Vec::new());
        assert_eq!(index.bbox(&mask), Some([10.0, 10.0, 11.0, 11.0]));
    }
}

//! Shared geometry for mapping between canvas and image space
//!
//! The image is letterboxed into the canvas: uniformly scaled to fit and
//! centered. Pointer events arrive in canvas coordinates and are mapped back
//! to image pixels for hit-testing.

use tiny_skia::Transform;

use crate::domain::ImagePoint;

/// Overlay opacity constants
pub mod overlay {
    /// Opacity of the selected-mask highlight
    pub const SELECTED_OPACITY: f32 = 0.6;
    /// Opacity of the hovered-mask highlight
    pub const HOVER_OPACITY: f32 = 0.6;
    /// Opacity of show-all overlays
    pub const SHOW_ALL_OPACITY: f32 = 0.4;
}

/// Canvas <-> image coordinate mapping for one canvas size and image size
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    canvas_width: f32,
    canvas_height: f32,
    image_width: u32,
    image_height: u32,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Viewport {
    pub fn new(canvas_width: f32, canvas_height: f32, image_width: u32, image_height: u32) -> Self {
        let mut viewport = Self {
            canvas_width,
            canvas_height,
            image_width,
            image_height,
            scale: 0.0,
            offset_x: 0.0,
            offset_y: 0.0,
        };
        viewport.recompute();
        viewport
    }

    /// Viewport showing the image at its native size
    pub fn identity(image_width: u32, image_height: u32) -> Self {
        Self::new(image_width as f32, image_height as f32, image_width, image_height)
    }

    fn recompute(&mut self) {
        let (wi, hi) = (self.image_width as f32, self.image_height as f32);
        let usable = self.canvas_width > 0.0
            && self.canvas_height > 0.0
            && self.canvas_width.is_finite()
            && self.canvas_height.is_finite()
            && self.image_width > 0
            && self.image_height > 0;
        if !usable {
            self.scale = 0.0;
            self.offset_x = 0.0;
            self.offset_y = 0.0;
            return;
        }
        self.scale = (self.canvas_width / wi).min(self.canvas_height / hi);
        self.offset_x = (self.canvas_width - wi * self.scale) / 2.0;
        self.offset_y = (self.canvas_height - hi * self.scale) / 2.0;
    }

    /// Recompute for a new canvas size (container resize)
    pub fn resize(&mut self, canvas_width: f32, canvas_height: f32) {
        self.canvas_width = canvas_width;
        self.canvas_height = canvas_height;
        self.recompute();
    }

    /// Recompute for a newly loaded image
    pub fn set_image_size(&mut self, image_width: u32, image_height: u32) {
        self.image_width = image_width;
        self.image_height = image_height;
        self.recompute();
    }

    /// True when no pointer position can map into the image
    pub fn is_degenerate(&self) -> bool {
        self.scale <= 0.0
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset(&self) -> (f32, f32) {
        (self.offset_x, self.offset_y)
    }

    pub fn canvas_size(&self) -> (f32, f32) {
        (self.canvas_width, self.canvas_height)
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.image_width, self.image_height)
    }

    /// Map a canvas position to an image pixel
    pub fn to_image(&self, px: f32, py: f32) -> ImagePoint {
        if self.is_degenerate() || !px.is_finite() || !py.is_finite() {
            return ImagePoint::OUTSIDE;
        }
        let fx = (px - self.offset_x) / self.scale;
        let fy = (py - self.offset_y) / self.scale;
        let max_x = (self.image_width - 1) as f32;
        let max_y = (self.image_height - 1) as f32;
        let in_bounds = fx >= 0.0
            && fy >= 0.0
            && fx < self.image_width as f32
            && fy < self.image_height as f32;
        ImagePoint {
            x: fx.clamp(0.0, max_x).floor() as u32,
            y: fy.clamp(0.0, max_y).floor() as u32,
            in_bounds,
        }
    }

    /// Map an image pixel to the canvas position of its center
    pub fn to_canvas(&self, ix: u32, iy: u32) -> (f32, f32) {
        (
            self.offset_x + (ix as f32 + 0.5) * self.scale,
            self.offset_y + (iy as f32 + 0.5) * self.scale,
        )
    }

    /// Where the image lands on the canvas as (x, y, width, height)
    pub fn image_rect(&self) -> (f32, f32, f32, f32) {
        (
            self.offset_x,
            self.offset_y,
            self.image_width as f32 * self.scale,
            self.image_height as f32 * self.scale,
        )
    }

    /// Image-to-canvas transform for drawing
    pub fn transform(&self) -> Transform {
        Transform::from_row(self.scale, 0.0, 0.0, self.scale, self.offset_x, self.offset_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_wide_canvas() {
        let vp = Viewport::new(400.0, 100.0, 100, 100);
        assert_eq!(vp.scale(), 1.0);
        assert_eq!(vp.offset(), (150.0, 0.0));
        assert_eq!(vp.to_image(150.0, 0.0), ImagePoint::inside(0, 0));
        assert_eq!(vp.to_image(249.9, 99.9), ImagePoint::inside(99, 99));
    }

    #[test]
    fn test_outside_is_clamped_and_flagged() {
        let vp = Viewport::new(400.0, 100.0, 100, 100);
        let p = vp.to_image(10.0, 50.0);
        assert!(!p.in_bounds);
        assert_eq!((p.x, p.y), (0, 50));
        let p = vp.to_image(390.0, 50.0);
        assert!(!p.in_bounds);
        assert_eq!((p.x, p.y), (99, 50));
    }

    #[test]
    fn test_round_trip_image_pixels() {
        for vp in [
            Viewport::new(640.0, 480.0, 100, 100),
            Viewport::new(333.0, 777.0, 120, 80),
            Viewport::new(50.0, 50.0, 200, 100),
        ] {
            for (ix, iy) in [(0, 0), (17, 42), (79, 79)] {
                let (px, py) = vp.to_canvas(ix, iy);
                assert_eq!(vp.to_image(px, py), ImagePoint::inside(ix, iy));
            }
        }
    }

    #[test]
    fn test_round_trip_canvas_within_one_pixel() {
        let vp = Viewport::new(640.0, 480.0, 1000, 750);
        for (px, py) in [(0.0, 0.0), (123.4, 56.7), (639.0, 479.0)] {
            let p = vp.to_image(px, py);
            let (qx, qy) = vp.to_canvas(p.x, p.y);
            // Within one image pixel, measured in image units
            assert!(((qx - px) / vp.scale()).abs() <= 1.0);
            assert!(((qy - py) / vp.scale()).abs() <= 1.0);
        }
    }

    #[test]
    fn test_resize_recomputes() {
        let mut vp = Viewport::new(100.0, 100.0, 100, 50);
        assert_eq!(vp.offset(), (0.0, 25.0));
        vp.resize(200.0, 50.0);
        assert_eq!(vp.scale(), 1.0);
        assert_eq!(vp.offset(), (50.0, 0.0));
    }

    #[test]
    fn test_degenerate_viewport() {
        let vp = Viewport::new(0.0, 100.0, 100, 100);
        assert!(vp.is_degenerate());
        assert_eq!(vp.to_image(10.0, 10.0), ImagePoint::OUTSIDE);
        let vp = Viewport::new(100.0, 100.0, 0, 100);
        assert!(!vp.to_image(10.0, 10.0).in_bounds);
    }
}

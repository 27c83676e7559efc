//! Conversions between `image` buffers and tiny-skia pixmaps, plus export
//!
//! Pixmaps are premultiplied; `RgbaImage` is straight alpha. All conversions
//! go through `ColorU8`/`PremultipliedColorU8` so semi-transparent pixels keep
//! their color.

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::{GrayImage, ImageFormat, Rgba, RgbaImage};
use tiny_skia::{ColorU8, Pixmap};

use super::compositor::draw_painted;
use crate::domain::ColoredMask;
use crate::masks::MaskIndex;

/// Copy a straight-alpha image into a pixmap of the same size
pub(crate) fn copy_into_pixmap(img: &RgbaImage, pixmap: &mut Pixmap) {
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
}

pub fn rgba_to_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height())?;
    copy_into_pixmap(img, &mut pixmap);
    Some(pixmap)
}

pub fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let mut out = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

/// Convert RgbaImage to Pixmap, apply drawing function, and copy back
fn with_pixmap(img: &mut RgbaImage, f: impl FnOnce(&mut Pixmap)) {
    let Some(mut pixmap) = rgba_to_pixmap(img) else {
        return;
    };
    f(&mut pixmap);
    *img = pixmap_to_rgba(&pixmap);
}

/// Bake committed paint into a copy of the base image
///
/// Highlights (hover, selection, show-all) are transient and never baked.
pub fn bake(base: &RgbaImage, index: &MaskIndex, painted: &[ColoredMask]) -> RgbaImage {
    let mut out = base.clone();
    if painted.is_empty() {
        return out;
    }
    with_pixmap(&mut out, |pixmap| {
        let Some(mut scratch) = tiny_skia::Mask::new(pixmap.width(), pixmap.height()) else {
            return;
        };
        draw_painted(pixmap, &mut scratch, index, painted);
    });
    out
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("Failed to encode PNG")?;
    Ok(bytes)
}

/// Encode a binary or intensity mask as a grayscale PNG
pub fn encode_mask_png(mask: &GrayImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    mask.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("Failed to encode mask PNG")?;
    Ok(bytes)
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to save image to {}", path.display()))?;
    log::info!("Saved {}x{} image to {}", img.width(), img.height(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayColor;
    use crate::domain::{MaskId, PaintSource, Rect};
    use crate::masks::index::tests::{indexed, rect_plane};

    #[test]
    fn test_pixmap_conversion_keeps_translucent_pixels() {
        let img = RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => Rgba([255, 0, 0, 255]),
            1 => Rgba([0, 0, 0, 0]),
            _ => Rgba([200, 100, 50, 255]),
        });
        let pixmap = rgba_to_pixmap(&img).unwrap();
        assert_eq!(pixmap_to_rgba(&pixmap), img);
    }

    #[test]
    fn test_bake_applies_only_paint() {
        let base = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let index = MaskIndex::from_masks(
            10,
            10,
            vec![indexed(1, 0, rect_plane(10, 10, Rect::new(0, 0, 5, 10), 255))],
        );
        let painted = [ColoredMask {
            source: PaintSource::Mask(MaskId(1)),
            color: OverlayColor::rgb(0.0, 0.0, 1.0),
            opacity: 1.0,
        }];
        let out = bake(&base, &index, &painted);
        assert!(out.get_pixel(2, 2).0[2] >= 253);
        assert_eq!(out.get_pixel(7, 2).0, [0, 0, 0, 255]);
        assert_eq!(bake(&base, &index, &[]), base);
    }

    #[test]
    fn test_encode_png_round_trips() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);

        let mask = GrayImage::from_pixel(2, 2, image::Luma([255]));
        assert!(!encode_mask_png(&mask).unwrap().is_empty());
    }
}

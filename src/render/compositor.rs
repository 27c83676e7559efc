//! Overlay compositing with tiny-skia
//!
//! Layers, bottom to top:
//! 1. the base image
//! 2. committed paint (`ColoredMask`), weighted by raw mask intensity
//! 3. show-all, selection and hover highlights for masks without paint
//!
//! Every layer is blended source-atop, so transparent parts of the base image
//! stay transparent. Output and scratch buffers are sized to the image and
//! reused across frames.

use std::collections::HashSet;

use image::{GrayImage, RgbaImage};
use tiny_skia::{BlendMode, Color, FilterQuality, Paint, Pixmap, PixmapPaint, Transform};

use super::geometry::{Viewport, overlay};
use super::image::{copy_into_pixmap, pixmap_to_rgba};
use crate::config::{EngineConfig, OverlayColor};
use crate::domain::{ColoredMask, MaskId, PaintSource, Rect, SelectionSet};
use crate::masks::{MaskIndex, PixelIndex};

/// Colors and opacities for highlight layers
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub selected: OverlayColor,
    pub hovered: OverlayColor,
    pub selected_opacity: f32,
    pub hover_opacity: f32,
    pub show_all_opacity: f32,
    pub palette: Vec<OverlayColor>,
}

impl OverlayStyle {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            selected: config.selected_color,
            hovered: config.hover_color,
            selected_opacity: config.overlay_opacity,
            hover_opacity: config.overlay_opacity,
            show_all_opacity: config.show_all_opacity,
            palette: config.palette.clone(),
        }
    }

    fn palette_color(&self, batch_index: usize) -> OverlayColor {
        if self.palette.is_empty() {
            return OverlayColor::default();
        }
        self.palette[batch_index % self.palette.len()]
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            selected_opacity: overlay::SELECTED_OPACITY,
            hover_opacity: overlay::HOVER_OPACITY,
            show_all_opacity: overlay::SHOW_ALL_OPACITY,
            ..Self::from_config(&EngineConfig::default())
        }
    }
}

/// Everything a redraw depends on
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub base: &'a RgbaImage,
    pub index: &'a MaskIndex,
    pub painted: &'a [ColoredMask],
    pub selected: &'a SelectionSet,
    pub hovered: Option<MaskId>,
    pub show_all: bool,
}

/// Per-pixel weight of a layer
enum Coverage<'a> {
    /// Raw mask intensity, 0-255
    Intensity(&'a GrayImage),
    /// Binary membership
    Members(&'a PixelIndex),
}

/// Blend `color` into `bounds`, weighted by coverage and opacity
fn draw_layer(
    pixmap: &mut Pixmap,
    scratch: &mut tiny_skia::Mask,
    coverage: Coverage<'_>,
    bounds: Rect,
    color: OverlayColor,
    opacity: f32,
) {
    let Some(bounds) = bounds.intersect(Rect::of_size(pixmap.width(), pixmap.height())) else {
        return;
    };
    if opacity <= 0.0 {
        return;
    }

    // Only the pixels inside `bounds` are written; fill_rect never reads past them
    let stride = scratch.width() as usize;
    let data = scratch.data_mut();
    for y in bounds.top..bounds.bottom {
        let row = y as usize * stride;
        for x in bounds.left..bounds.right {
            data[row + x as usize] = match &coverage {
                Coverage::Intensity(plane) => plane
                    .get_pixel_checked(x as u32, y as u32)
                    .map_or(0, |p| p.0[0]),
                Coverage::Members(pixels) => {
                    if pixels.contains(x, y) {
                        255
                    } else {
                        0
                    }
                }
            };
        }
    }

    let Some(rect) = tiny_skia::Rect::from_ltrb(
        bounds.left as f32,
        bounds.top as f32,
        bounds.right as f32,
        bounds.bottom as f32,
    ) else {
        return;
    };
    let [r, g, b, _] = color.to_rgba_u8();
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, (opacity.clamp(0.0, 1.0) * 255.0).round() as u8);
    paint.anti_alias = false;
    paint.blend_mode = BlendMode::SourceAtop;
    pixmap.fill_rect(rect, &paint, Transform::identity(), Some(&*scratch));
}

/// Draw committed paint layers, returning the mask ids they cover
pub(crate) fn draw_painted(
    pixmap: &mut Pixmap,
    scratch: &mut tiny_skia::Mask,
    index: &MaskIndex,
    painted: &[ColoredMask],
) -> HashSet<MaskId> {
    let full = Rect::of_size(pixmap.width(), pixmap.height());
    let mut covered = HashSet::new();
    for layer in painted {
        match &layer.source {
            PaintSource::Mask(id) => {
                let Some(mask) = index.get(*id) else {
                    log::debug!("Painted mask {} is not in the current batch", id);
                    continue;
                };
                covered.insert(*id);
                let Some(bounds) = mask.pixels.extent() else {
                    continue;
                };
                draw_layer(
                    pixmap,
                    scratch,
                    Coverage::Intensity(&mask.intensity),
                    bounds,
                    layer.color,
                    layer.opacity,
                );
            }
            PaintSource::Inline { plane, .. } => {
                draw_layer(
                    pixmap,
                    scratch,
                    Coverage::Intensity(plane),
                    full,
                    layer.color,
                    layer.opacity,
                );
            }
        }
    }
    covered
}

/// Reusable renderer for one session
pub struct Compositor {
    style: OverlayStyle,
    canvas: Option<Pixmap>,
    scratch: Option<tiny_skia::Mask>,
    display: Option<Pixmap>,
}

impl Compositor {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            canvas: None,
            scratch: None,
            display: None,
        }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: OverlayStyle) {
        self.style = style;
    }

    /// Size of the image-resolution buffers, if allocated
    pub fn buffer_size(&self) -> Option<(u32, u32)> {
        self.canvas.as_ref().map(|p| (p.width(), p.height()))
    }

    /// Make sure buffers match the image; reallocates only on size change
    fn prepare(&mut self, width: u32, height: u32) -> bool {
        if self.buffer_size() != Some((width, height)) {
            log::debug!("Allocating compositor buffers {}x{}", width, height);
            self.canvas = Pixmap::new(width, height);
            self.scratch = tiny_skia::Mask::new(width, height);
        }
        self.canvas.is_some() && self.scratch.is_some()
    }

    fn compose(&mut self, frame: &Frame<'_>) -> bool {
        let (width, height) = frame.base.dimensions();
        if !self.prepare(width, height) {
            return false;
        }
        let (Some(canvas), Some(scratch)) = (self.canvas.as_mut(), self.scratch.as_mut()) else {
            return false;
        };

        copy_into_pixmap(frame.base, canvas);

        if frame.index.dimensions() != (width, height) && !frame.index.is_empty() {
            log::warn!(
                "Mask index is {:?} but image is {}x{}, skipping overlays",
                frame.index.dimensions(),
                width,
                height
            );
            return true;
        }

        let painted = draw_painted(canvas, scratch, frame.index, frame.painted);

        let highlight = |id: MaskId| !painted.contains(&id);

        if frame.show_all {
            for mask in frame.index.iter() {
                if !highlight(mask.id)
                    || frame.selected.contains(mask.id)
                    || frame.hovered == Some(mask.id)
                {
                    continue;
                }
                if let Some(bounds) = mask.pixels.bounds() {
                    draw_layer(
                        canvas,
                        scratch,
                        Coverage::Members(&mask.pixels),
                        bounds,
                        self.style.palette_color(mask.batch_index),
                        self.style.show_all_opacity,
                    );
                }
            }
        }

        for id in frame.selected.iter().filter(|id| highlight(*id)) {
            let Some(mask) = frame.index.get(id) else {
                continue;
            };
            if let Some(bounds) = mask.pixels.bounds() {
                draw_layer(
                    canvas,
                    scratch,
                    Coverage::Members(&mask.pixels),
                    bounds,
                    self.style.selected,
                    self.style.selected_opacity,
                );
            }
        }

        if let Some(id) = frame.hovered
            && highlight(id)
            && !frame.selected.contains(id)
            && let Some(mask) = frame.index.get(id)
            && let Some(bounds) = mask.pixels.bounds()
        {
            draw_layer(
                canvas,
                scratch,
                Coverage::Members(&mask.pixels),
                bounds,
                self.style.hovered,
                self.style.hover_opacity,
            );
        }

        true
    }

    /// Redraw the frame at image resolution
    pub fn render(&mut self, frame: &Frame<'_>) -> Option<&Pixmap> {
        if !self.compose(frame) {
            return None;
        }
        self.canvas.as_ref()
    }

    /// Redraw the frame and copy it out as an image
    pub fn render_image(&mut self, frame: &Frame<'_>) -> Option<RgbaImage> {
        self.render(frame).map(pixmap_to_rgba)
    }

    /// Redraw the frame letterboxed into a canvas-sized surface
    pub fn render_scaled(&mut self, frame: &Frame<'_>, viewport: &Viewport) -> Option<&Pixmap> {
        if !self.compose(frame) {
            return None;
        }
        let (cw, ch) = viewport.canvas_size();
        let (cw, ch) = (cw.ceil().max(0.0) as u32, ch.ceil().max(0.0) as u32);
        if self.display.as_ref().map(|p| (p.width(), p.height())) != Some((cw, ch)) {
            self.display = Pixmap::new(cw, ch);
        }
        let (Some(canvas), Some(display)) = (self.canvas.as_ref(), self.display.as_mut()) else {
            return None;
        };

        display.fill(Color::TRANSPARENT);
        let paint = PixmapPaint {
            quality: FilterQuality::Nearest,
            ..Default::default()
        };
        display.draw_pixmap(0, 0, canvas.as_ref(), &paint, viewport.transform(), None);
        self.display.as_ref()
    }
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("style", &self.style)
            .field("buffer_size", &self.buffer_size())
            .finish()
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

//! Session state for one image and its mask batch
//!
//! `Session` is the single owner of everything pointer handling and
//! rendering read: the image, the published batch, selection, hover and
//! committed paint. It is driven through `&mut` by its caller and holds no
//! locks.

use std::sync::Arc;

use image::RgbaImage;

use crate::config::{EngineConfig, OverlayColor};
use crate::domain::{
    ColoredMask, InteractionMode, Mask, MaskId, PaintSource, SelectionPhase, SelectionSet,
};
use crate::masks::{IndexedMask, LoadTicket, LoadedBatch, MaskIndex};
use crate::render::Frame;
use crate::render::geometry::Viewport;

/// The image being edited and its content hash
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub hash: String,
    pub pixels: Arc<RgbaImage>,
}

#[derive(Debug, Clone)]
pub struct Session {
    image: Option<LoadedImage>,
    masks: Vec<Mask>,
    index: MaskIndex,
    selection: SelectionSet,
    hovered: Option<MaskId>,
    painted: Vec<ColoredMask>,
    /// Bumped by every image change and every load; stale loads are dropped
    epoch: u64,
    pub mode: InteractionMode,
    pub show_all: bool,
    pub viewport: Viewport,
    pub threshold: u8,
    pub hover_neighborhood: bool,
}

impl Session {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            image: None,
            masks: Vec::new(),
            index: MaskIndex::default(),
            selection: SelectionSet::new(),
            hovered: None,
            painted: Vec::new(),
            epoch: 0,
            mode: InteractionMode::default(),
            show_all: false,
            viewport: Viewport::new(0.0, 0.0, 0, 0),
            threshold: config.threshold,
            hover_neighborhood: config.hover_neighborhood,
        }
    }

    // ========================================================================
    // Image and batch lifecycle
    // ========================================================================

    /// Start over with a new image; drops the batch, selection and paint
    pub fn load_image(&mut self, hash: String, pixels: Arc<RgbaImage>) {
        let (width, height) = pixels.dimensions();
        log::info!("Session image {} ({}x{})", hash, width, height);
        self.epoch += 1;
        self.masks.clear();
        self.index = MaskIndex::empty(width, height);
        self.selection.clear();
        self.hovered = None;
        self.painted.clear();
        self.viewport.set_image_size(width, height);
        if self.viewport.canvas_size() == (0.0, 0.0) {
            // No canvas yet: show the image at native size
            self.viewport.resize(width as f32, height as f32);
        }
        self.image = Some(LoadedImage { hash, pixels });
    }

    /// Forget the image and everything derived from it
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.image = None;
        self.masks.clear();
        self.index = MaskIndex::default();
        self.selection.clear();
        self.hovered = None;
        self.painted.clear();
        self.mode = InteractionMode::default();
        self.viewport.set_image_size(0, 0);
    }

    /// Claim a new load; any earlier ticket becomes stale
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        let hash = self.image.as_ref()?.hash.clone();
        self.epoch += 1;
        Some(LoadTicket {
            epoch: self.epoch,
            image_hash: hash,
        })
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.epoch == self.epoch && self.image_hash() == Some(ticket.image_hash.as_str())
    }

    /// Publish a finished batch if its ticket is still current
    ///
    /// Replaces the batch and index in one step and clears selection and
    /// hover. Paint on masks of the old batch is detached so it survives.
    pub fn accept_batch(&mut self, batch: LoadedBatch) -> bool {
        if !self.is_current(&batch.ticket) {
            log::debug!(
                "Discarding stale batch for {} (epoch {}, current {})",
                batch.ticket.image_hash,
                batch.ticket.epoch,
                self.epoch
            );
            return false;
        }

        self.detach_paint();
        self.masks = batch.masks;
        self.index = batch.index;
        self.selection.clear();
        self.hovered = None;
        log::info!(
            "Published {} masks for {} ({} skipped)",
            self.masks.len(),
            batch.ticket.image_hash,
            batch.skipped.len()
        );
        true
    }

    fn detach_paint(&mut self) {
        for layer in &mut self.painted {
            if let PaintSource::Mask(id) = layer.source
                && let Some(mask) = self.index.get(id)
            {
                layer.source = PaintSource::Inline {
                    origin: id,
                    plane: Arc::clone(&mask.intensity),
                };
            }
        }
    }

    /// Fresh id for a generated mask: one past the largest id in the batch
    pub fn next_mask_id(&self) -> MaskId {
        self.masks
            .iter()
            .map(|m| m.id.0)
            .max()
            .map_or(MaskId(0), |max| MaskId(max.saturating_add(1)))
    }

    /// Batch position for the next appended mask
    pub fn next_batch_index(&self) -> usize {
        self.index
            .iter()
            .map(|m| m.batch_index + 1)
            .max()
            .unwrap_or(0)
    }

    /// Append one generated mask, rebuild the index and select it
    pub fn append_mask(&mut self, mask: Mask, indexed: IndexedMask) {
        let id = mask.id;
        let (width, height) = self.index.dimensions();
        let mut entries: Vec<IndexedMask> = self
            .index
            .iter()
            .filter(|m| m.id != id)
            .cloned()
            .collect();
        entries.push(indexed);
        self.masks.retain(|m| m.id != id);
        self.masks.push(mask);
        self.index = MaskIndex::from_masks(width, height, entries);
        self.selection.insert(id);
        log::debug!("Appended mask {} ({} total)", id, self.masks.len());
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn image(&self) -> Option<&LoadedImage> {
        self.image.as_ref()
    }

    pub fn image_hash(&self) -> Option<&str> {
        self.image.as_ref().map(|i| i.hash.as_str())
    }

    pub fn masks(&self) -> &[Mask] {
        &self.masks
    }

    pub fn index(&self) -> &MaskIndex {
        &self.index
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn hovered(&self) -> Option<MaskId> {
        self.hovered
    }

    pub fn painted(&self) -> &[ColoredMask] {
        &self.painted
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> SelectionPhase<'_> {
        if !self.selection.is_empty() {
            SelectionPhase::Selected(&self.selection)
        } else if let Some(id) = self.hovered {
            SelectionPhase::Hovering(id)
        } else {
            SelectionPhase::Idle
        }
    }

    /// Everything the compositor needs for a redraw
    pub fn frame(&self) -> Option<Frame<'_>> {
        let image = self.image.as_ref()?;
        Some(Frame {
            base: &image.pixels,
            index: &self.index,
            painted: &self.painted,
            selected: &self.selection,
            hovered: self.hovered,
            show_all: self.show_all,
        })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Returns true if the hovered mask changed
    pub fn set_hover(&mut self, id: Option<MaskId>) -> bool {
        let id = id.filter(|id| self.index.contains_id(*id));
        if self.hovered == id {
            return false;
        }
        self.hovered = id;
        true
    }

    /// Mutable selection access, restricted to ids of the current batch
    pub(crate) fn select_with(&mut self, id: MaskId, f: impl FnOnce(&mut SelectionSet)) -> bool {
        if !self.index.contains_id(id) {
            return false;
        }
        let before = self.selection.clone();
        f(&mut self.selection);
        self.selection != before
    }

    pub fn clear_selection(&mut self) -> bool {
        if self.selection.is_empty() {
            return false;
        }
        self.selection.clear();
        true
    }

    pub fn select_all(&mut self) -> bool {
        let all: SelectionSet = self.index.ids().collect();
        if all == self.selection {
            return false;
        }
        self.selection = all;
        true
    }

    /// Add or update the paint layer for a mask id
    pub fn upsert_paint(&mut self, id: MaskId, color: OverlayColor, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        match self.painted.iter_mut().find(|c| c.mask_id() == Some(id)) {
            Some(layer) => {
                layer.color = color;
                layer.opacity = opacity;
            }
            None => self.painted.push(ColoredMask {
                source: PaintSource::Mask(id),
                color,
                opacity,
            }),
        }
    }

    /// Commit the selection as paint; returns how many masks were painted
    pub fn paint_selection(&mut self, color: OverlayColor, opacity: f32) -> usize {
        let ids: Vec<MaskId> = self.selection.iter().collect();
        for id in &ids {
            self.upsert_paint(*id, color, opacity);
        }
        self.selection.clear();
        if !ids.is_empty() {
            log::debug!("Painted {} masks with {}", ids.len(), color.to_hex());
        }
        ids.len()
    }

    /// Drop paint committed on `id`, including paint detached by a regeneration
    pub fn unpaint(&mut self, id: MaskId) -> bool {
        let before = self.painted.len();
        self.painted.retain(|c| c.origin() != id);
        self.painted.len() != before
    }

    pub fn clear_paint(&mut self) -> bool {
        let changed = !self.painted.is_empty();
        self.painted.clear();
        changed
    }

    /// Switch interaction mode; generate mode has no hover
    pub fn set_mode(&mut self, mode: InteractionMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        if mode == InteractionMode::Generate {
            self.hovered = None;
        }
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

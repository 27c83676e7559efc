//! Engine facade
//!
//! Owns one `Session` plus the collaborators around it: the mask generator,
//! the cache and the compositor. Callers feed it image bytes, pointer events
//! and commands, and pull rendered frames or exports back out.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use image::{GrayImage, RgbaImage};
use tiny_skia::Pixmap;

use crate::cache::{CacheManager, CacheStatus, image_hash};
use crate::config::{EngineConfig, OverlayColor};
use crate::domain::{Mask, MaskId, validate_batch};
use crate::generator::{GenerationRequest, MaskGenerator, PointRequest};
use crate::masks::{LoadedBatch, load_batch, load_single};
use crate::render::image::{bake, encode_png};
use crate::render::{Compositor, OverlayStyle};
use crate::session::{self, Msg, Outcome, PointerEvent, Session};

/// Result of opening an image or regenerating its masks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReport {
    pub image_hash: String,
    /// Masks came from the cache and the generator was not called
    pub from_cache: bool,
    /// Masks published to the session
    pub masks: usize,
    /// Masks that failed to decode
    pub skipped: Vec<MaskId>,
}

pub struct Engine<G> {
    config: EngineConfig,
    generator: G,
    cache: CacheManager,
    session: Session,
    compositor: Compositor,
}

impl<G> std::fmt::Debug for Engine<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("image", &self.session.image_hash())
            .field("masks", &self.session.masks().len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<G: MaskGenerator> Engine<G> {
    pub fn new(config: EngineConfig, generator: G, cache: CacheManager) -> Self {
        Self {
            session: Session::new(&config),
            compositor: Compositor::new(OverlayStyle::from_config(&config)),
            config,
            generator,
            cache,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    // ========================================================================
    // Image and mask loading
    // ========================================================================

    /// Decode an image, then load its masks from the cache or the generator
    pub async fn open_image(&mut self, bytes: &[u8]) -> Result<OpenReport> {
        let pixels = image::load_from_memory(bytes)
            .context("Failed to decode image")?
            .to_rgba8();
        let hash = image_hash(bytes);
        self.session.load_image(hash, Arc::new(pixels));
        self.fetch_masks(true).await
    }

    /// Ask the generator for a fresh batch, bypassing cached masks
    pub async fn regenerate(&mut self) -> Result<OpenReport> {
        self.fetch_masks(false).await
    }

    async fn fetch_masks(&mut self, use_cache: bool) -> Result<OpenReport> {
        let Some(hash) = self.session.image_hash().map(str::to_string) else {
            bail!("No image loaded");
        };

        let cached = if use_cache { self.cache.get(&hash) } else { None };
        let (masks, from_cache) = match cached {
            Some(entry) => (entry.masks, true),
            None => {
                let req = GenerationRequest {
                    image_hash: hash.clone(),
                    params: self.config.generation,
                };
                let masks = self
                    .generator
                    .generate_all(&req)
                    .await
                    .with_context(|| format!("Mask generation failed for {}", hash))?;
                validate_batch(&masks)?;
                self.cache.put(&hash, &masks, self.config.generation);
                (masks, false)
            }
        };

        self.publish(masks, from_cache).await
    }

    /// Decode and publish a batch supplied by the caller, skipping the cache
    pub async fn load_masks(&mut self, masks: Vec<Mask>) -> Result<OpenReport> {
        validate_batch(&masks)?;
        self.publish(masks, false).await
    }

    async fn publish(&mut self, masks: Vec<Mask>, from_cache: bool) -> Result<OpenReport> {
        let Some(load) = self.start_load(masks) else {
            bail!("No image loaded");
        };
        let batch = load.await;
        let report = OpenReport {
            image_hash: batch.ticket.image_hash.clone(),
            from_cache,
            masks: batch.masks.len(),
            skipped: batch.skipped.clone(),
        };
        if !self.finish_load(batch) {
            bail!("Mask batch for {} was superseded", report.image_hash);
        }
        Ok(report)
    }

    /// Begin decoding a batch for the current image
    ///
    /// The returned future borrows nothing from the engine, so it can be
    /// spawned. Starting another load makes this one stale.
    pub fn start_load(
        &mut self,
        masks: Vec<Mask>,
    ) -> Option<impl Future<Output = LoadedBatch> + Send + use<G>> {
        let ticket = self.session.begin_load()?;
        let (width, height) = self.session.index().dimensions();
        Some(load_batch(
            ticket,
            masks,
            width,
            height,
            self.session.threshold,
        ))
    }

    /// Publish a decoded batch; false if a newer load or image superseded it
    pub fn finish_load(&mut self, batch: LoadedBatch) -> bool {
        self.session.accept_batch(batch)
    }

    /// Drop the image, masks and paint
    pub fn reset(&mut self) {
        self.session.reset();
    }

    // ========================================================================
    // Interaction
    // ========================================================================

    /// Handle pointer input; generate-mode clicks call the generator
    pub async fn handle_pointer(&mut self, event: PointerEvent) -> Result<Outcome> {
        match session::handle_pointer(&mut self.session, event) {
            Outcome::Generate(req) => {
                self.generate_at(req).await?;
                Ok(Outcome::Redraw)
            }
            outcome => Ok(outcome),
        }
    }

    pub fn handle_msg(&mut self, msg: Msg) -> Outcome {
        session::handle_msg(&mut self.session, msg)
    }

    /// Paint the selection with `color` at the configured paint opacity
    pub fn paint(&mut self, color: OverlayColor) -> Outcome {
        let opacity = self.config.paint_opacity;
        self.handle_msg(Msg::Paint { color, opacity })
    }

    /// Generate one mask at an image point, append it and select it
    pub async fn generate_at(&mut self, req: PointRequest) -> Result<MaskId> {
        let mut mask = self
            .generator
            .generate_at_point(&req)
            .await
            .with_context(|| format!("Point generation failed at ({}, {})", req.x, req.y))?;

        if self.session.image_hash() != Some(req.image_hash.as_str()) {
            bail!("Image changed while generating a mask for {}", req.image_hash);
        }

        let id = self.session.next_mask_id();
        mask.id = id;
        let (width, height) = self.session.index().dimensions();
        let (mask, indexed) = load_single(
            mask,
            self.session.next_batch_index(),
            width,
            height,
            self.session.threshold,
        )
        .await?;
        self.session.append_mask(mask, indexed);
        log::info!("Generated mask {} at ({}, {})", id, req.x, req.y);
        Ok(id)
    }

    // ========================================================================
    // Rendering and export
    // ========================================================================

    /// Compose the current state at image resolution
    pub fn render(&mut self) -> Option<&Pixmap> {
        let frame = self.session.frame()?;
        self.compositor.render(&frame)
    }

    pub fn render_image(&mut self) -> Option<RgbaImage> {
        let frame = self.session.frame()?;
        self.compositor.render_image(&frame)
    }

    /// Compose the current state into the canvas
    pub fn render_scaled(&mut self) -> Option<&Pixmap> {
        let frame = self.session.frame()?;
        self.compositor.render_scaled(&frame, &self.session.viewport)
    }

    /// The image with committed paint baked in
    pub fn export(&self) -> Option<RgbaImage> {
        let image = self.session.image()?;
        Some(bake(&image.pixels, self.session.index(), self.session.painted()))
    }

    pub fn export_png(&self) -> Result<Vec<u8>> {
        let Some(img) = self.export() else {
            bail!("No image loaded");
        };
        encode_png(&img)
    }

    /// Selected masks combined into one binary mask
    pub fn selection_mask(&self) -> GrayImage {
        self.session
            .index()
            .union(self.session.selection().iter())
    }

    // ========================================================================
    // Cache
    // ========================================================================

    pub fn cache_status(&self) -> CacheStatus {
        self.cache.status()
    }

    pub fn clear_cache(&mut self) -> usize {
        self.cache.clear()
    }

    pub fn cached_embedding(&self) -> Option<Vec<u8>> {
        self.cache.get_embedding(self.session.image_hash()?)
    }

    /// Store an embedding for the current image
    pub fn store_embedding(&mut self, embedding: Vec<u8>) -> bool {
        let Some(hash) = self.session.image_hash().map(str::to_string) else {
            return false;
        };
        self.cache.put_embedding(&hash, embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InteractionMode, Modifiers, PointerButton, Rect};
    use crate::masks::loader::tests::{encode, png_rect_mask};
    use image::{DynamicImage, Rgba};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGenerator {
        masks: Vec<Mask>,
        point_mask: Option<Mask>,
        fail: bool,
        calls: AtomicUsize,
        point_calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn new(masks: Vec<Mask>) -> Self {
            Self {
                masks,
                point_mask: None,
                fail: false,
                calls: AtomicUsize::new(0),
                point_calls: AtomicUsize::new(0),
            }
        }
    }

    impl MaskGenerator for FakeGenerator {
        async fn generate_all(&self, _req: &GenerationRequest) -> Result<Vec<Mask>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("service unavailable");
            }
            Ok(self.masks.clone())
        }

        async fn generate_at_point(&self, _req: &PointRequest) -> Result<Mask> {
            self.point_calls.fetch_add(1, Ordering::SeqCst);
            self.point_mask.clone().context("no point mask")
        }
    }

    fn image_bytes(seed: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(100, 100, Rgba([seed, 200, 200, 255]));
        encode(DynamicImage::ImageRgba8(img))
    }

    fn three_rect_masks() -> Vec<Mask> {
        vec![
            png_rect_mask(1, 100, 100, Rect::new(0, 0, 30, 30)),
            png_rect_mask(2, 100, 100, Rect::new(40, 40, 60, 60)),
            png_rect_mask(3, 100, 100, Rect::new(70, 0, 100, 30)),
        ]
    }

    fn engine(generator: FakeGenerator) -> Engine<FakeGenerator> {
        let config = EngineConfig::default();
        let cache = CacheManager::in_memory(&config);
        Engine::new(config, generator, cache)
    }

    fn selected(engine: &Engine<FakeGenerator>) -> Vec<u32> {
        engine.session().selection().iter().map(|id| id.0).collect()
    }

    #[tokio::test]
    async fn test_select_extend_remove() {
        let mut engine = engine(FakeGenerator::new(three_rect_masks()));
        let report = engine.open_image(&image_bytes(1)).await.unwrap();
        assert_eq!(report.masks, 3);
        assert!(!report.from_cache);

        engine.handle_pointer(PointerEvent::click(50.0, 50.0)).await.unwrap();
        assert_eq!(selected(&engine), vec![2]);

        let shift = PointerEvent::press(5.0, 5.0, PointerButton::Primary, Modifiers::extend());
        engine.handle_pointer(shift).await.unwrap();
        assert_eq!(selected(&engine), vec![1, 2]);

        let right = PointerEvent::press(50.0, 50.0, PointerButton::Secondary, Modifiers::NONE);
        engine.handle_pointer(right).await.unwrap();
        assert_eq!(selected(&engine), vec![1]);
    }

    #[tokio::test]
    async fn test_overlapping_hover_prefers_small_mask() {
        let masks = vec![
            png_rect_mask(1, 100, 100, Rect::new(0, 0, 25, 20)),
            png_rect_mask(2, 100, 100, Rect::new(5, 8, 15, 13)),
        ];
        let mut engine = engine(FakeGenerator::new(masks));
        engine.open_image(&image_bytes(1)).await.unwrap();
        engine.handle_pointer(PointerEvent::moved(10.5, 10.5)).await.unwrap();
        assert_eq!(engine.session().hovered(), Some(MaskId(2)));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_generator() {
        let mut engine = engine(FakeGenerator::new(three_rect_masks()));
        let first = engine.open_image(&image_bytes(1)).await.unwrap();
        let second = engine.open_image(&image_bytes(1)).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.image_hash, first.image_hash);
        assert_eq!(second.masks, 3);
        assert_eq!(engine.generator().calls.load(Ordering::SeqCst), 1);

        engine.open_image(&image_bytes(2)).await.unwrap();
        assert_eq!(engine.generator().calls.load(Ordering::SeqCst), 2);

        let regenerated = engine.regenerate().await.unwrap();
        assert!(!regenerated.from_cache);
        assert_eq!(engine.generator().calls.load(Ordering::SeqCst), 3);
        assert_eq!(engine.cache_status().entries, 2);
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let mut generator = FakeGenerator::new(Vec::new());
        generator.fail = true;
        let mut engine = engine(generator);
        let err = engine.open_image(&image_bytes(1)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("service unavailable"));
        assert!(engine.open_image(b"not an image").await.is_err());
    }

    #[tokio::test]
    async fn test_generate_mode_appends_and_selects() {
        let mut generator = FakeGenerator::new(three_rect_masks());
        generator.point_mask = Some(png_rect_mask(0, 100, 100, Rect::new(0, 80, 20, 100)));
        let mut engine = engine(generator);
        engine.open_image(&image_bytes(1)).await.unwrap();

        engine.handle_msg(Msg::SetMode(InteractionMode::Generate));
        let outcome = engine.handle_pointer(PointerEvent::click(5.0, 90.0)).await.unwrap();
        assert_eq!(outcome, Outcome::Redraw);
        assert_eq!(engine.generator().point_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.session().masks().len(), 4);
        assert_eq!(selected(&engine), vec![4]);

        engine.handle_msg(Msg::SetMode(InteractionMode::Select));
        engine.handle_pointer(PointerEvent::moved(5.0, 90.0)).await.unwrap();
        assert_eq!(engine.session().hovered(), Some(MaskId(4)));
    }

    #[tokio::test]
    async fn test_stale_load_is_dropped() {
        let mut engine = engine(FakeGenerator::new(Vec::new()));
        engine.open_image(&image_bytes(1)).await.unwrap();

        let old = engine.start_load(three_rect_masks()).unwrap();
        let new = engine
            .start_load(vec![png_rect_mask(9, 100, 100, Rect::new(0, 0, 10, 10))])
            .unwrap();
        let new = new.await;
        let old = old.await;
        assert!(engine.finish_load(new));
        assert!(!engine.finish_load(old));
        assert_eq!(engine.session().masks().len(), 1);
        assert_eq!(engine.session().masks()[0].id, MaskId(9));
    }

    #[tokio::test]
    async fn test_render_and_export() {
        let mut engine = engine(FakeGenerator::new(three_rect_masks()));
        engine.open_image(&image_bytes(1)).await.unwrap();
        let base = engine.session().image().unwrap().pixels.as_ref().clone();

        assert_eq!(engine.render_image().unwrap(), base);
        assert_eq!(engine.export().unwrap(), base);

        engine.handle_pointer(PointerEvent::click(50.0, 50.0)).await.unwrap();
        assert_eq!(engine.selection_mask().get_pixel(50, 50).0[0], 255);
        assert_ne!(engine.render_image().unwrap(), base);
        // Selection highlights are never exported
        assert_eq!(engine.export().unwrap(), base);

        assert_eq!(engine.paint(OverlayColor::rgb(1.0, 0.0, 0.0)), Outcome::Redraw);
        let exported = engine.export().unwrap();
        assert_ne!(exported.get_pixel(50, 50), base.get_pixel(50, 50));
        assert_eq!(exported.get_pixel(5, 5), base.get_pixel(5, 5));
        assert!(!engine.export_png().unwrap().is_empty());

        // Paint survives a regeneration of the same image
        engine.regenerate().await.unwrap();
        assert_eq!(engine.export().unwrap(), exported);
    }

    #[tokio::test]
    async fn test_idle_render_is_base_plus_paint() {
        let mut engine = engine(FakeGenerator::new(three_rect_masks()));
        engine.open_image(&image_bytes(1)).await.unwrap();

        engine.handle_pointer(PointerEvent::click(10.0, 10.0)).await.unwrap();
        engine.handle_pointer(PointerEvent::press(
            50.0,
            50.0,
            PointerButton::Primary,
            Modifiers::extend(),
        ))
        .await
        .unwrap();
        engine.handle_msg(Msg::Paint {
            color: OverlayColor::rgb(0.0, 0.0, 1.0),
            opacity: 0.5,
        });
        engine.handle_pointer(PointerEvent::leave()).await.unwrap();

        let session = engine.session();
        assert!(session.selection().is_empty());
        assert_eq!(session.hovered(), None);
        assert!(!session.show_all);
        assert_eq!(session.painted().len(), 2);
        let baked = bake(
            &session.image().unwrap().pixels,
            session.index(),
            session.painted(),
        );
        assert_eq!(engine.render_image().unwrap(), baked);
        assert_eq!(engine.export().unwrap(), baked);

        // Still holds once the paint is detached by a regeneration
        engine.regenerate().await.unwrap();
        assert_eq!(engine.render_image().unwrap(), baked);
    }

    #[tokio::test]
    async fn test_embeddings_follow_current_image() {
        let mut engine = engine(FakeGenerator::new(Vec::new()));
        assert!(!engine.store_embedding(vec![1]));
        engine.open_image(&image_bytes(1)).await.unwrap();
        assert!(engine.store_embedding(vec![1, 2]));
        assert_eq!(engine.cached_embedding(), Some(vec![1, 2]));
        engine.open_image(&image_bytes(2)).await.unwrap();
        assert_eq!(engine.cached_embedding(), None);
    }
}

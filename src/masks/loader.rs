//! Mask batch decoding
//!
//! Every mask payload is decoded exactly once per batch on the blocking pool.
//! The resulting `LoadedBatch` is only handed out once all masks have either
//! decoded or been skipped, and it carries the `LoadTicket` it was started
//! with so the session can drop it if a newer load superseded it.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures::stream::{FuturesUnordered, StreamExt};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};

use super::index::{IndexedMask, MaskIndex, PixelIndex};
use crate::domain::{Mask, MaskId};

/// Identity of one load, compared against the session on completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub epoch: u64,
    pub image_hash: String,
}

/// A fully resolved batch, ready to be published
#[derive(Debug)]
pub struct LoadedBatch {
    pub ticket: LoadTicket,
    /// Successfully decoded masks, in batch order
    pub masks: Vec<Mask>,
    pub index: MaskIndex,
    /// Masks that failed to decode
    pub skipped: Vec<MaskId>,
}

/// Decode a mask payload into an intensity plane sized `width` x `height`
///
/// Intensity is the brightest color channel; alpha does not weaken it. Masks
/// that carry all of their information in the alpha channel (black RGB) fall
/// back to alpha alone. Masks at a different resolution are resized with
/// nearest-neighbour sampling.
pub fn decode_intensity(mask: &Mask, width: u32, height: u32) -> Result<GrayImage> {
    if mask.bitmap.is_empty() {
        bail!("mask {} has an empty bitmap", mask.id);
    }
    let decoded = image::load_from_memory(&mask.bitmap)
        .with_context(|| format!("Failed to decode mask {}", mask.id))?;
    let decoded = if decoded.width() != width || decoded.height() != height {
        log::debug!(
            "Resizing mask {} from {}x{} to {}x{}",
            mask.id,
            decoded.width(),
            decoded.height(),
            width,
            height
        );
        decoded.resize_exact(width, height, FilterType::Nearest)
    } else {
        decoded
    };
    Ok(intensity_plane(&decoded))
}

fn intensity_plane(img: &DynamicImage) -> GrayImage {
    let rgba = img.to_rgba8();

    let mut any_color = false;
    let plane = GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, _] = rgba.get_pixel(x, y).0;
        let brightest = r.max(g).max(b);
        any_color |= brightest > 0;
        Luma([brightest])
    });

    if img.color().has_alpha() && !any_color {
        return GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            Luma([rgba.get_pixel(x, y).0[3]])
        });
    }
    plane
}

/// Decode and index one mask; runs on the blocking pool
fn index_mask(
    mask: &Mask,
    batch_index: usize,
    width: u32,
    height: u32,
    threshold: u8,
) -> Result<IndexedMask> {
    let intensity = decode_intensity(mask, width, height)?;
    let pixels = PixelIndex::build(&intensity, threshold);
    if pixels.area() == 0 {
        log::debug!("Mask {} has no pixels above threshold {}", mask.id, threshold);
    }
    Ok(IndexedMask {
        id: mask.id,
        batch_index,
        intensity: Arc::new(intensity),
        pixels,
    })
}

/// Decode every mask of a batch concurrently and build the batch index
///
/// Individual decode failures are logged and skipped.
pub async fn load_batch(
    ticket: LoadTicket,
    masks: Vec<Mask>,
    width: u32,
    height: u32,
    threshold: u8,
) -> LoadedBatch {
    let total = masks.len();
    let mut results = masks
        .into_iter()
        .enumerate()
        .map(|(batch_index, mask)| async move {
            let id = mask.id;
            let joined = tokio::task::spawn_blocking(move || {
                let indexed = index_mask(&mask, batch_index, width, height, threshold);
                (mask, indexed)
            })
            .await;
            (batch_index, id, joined)
        })
        .collect::<FuturesUnordered<_>>()
        .collect::<Vec<_>>()
        .await;
    results.sort_by_key(|(batch_index, _, _)| *batch_index);

    let mut kept = Vec::with_capacity(total);
    let mut indexed = Vec::with_capacity(total);
    let mut skipped = Vec::new();
    for (_, id, joined) in results {
        match joined {
            Ok((mask, Ok(entry))) => {
                kept.push(mask);
                indexed.push(entry);
            }
            Ok((_, Err(err))) => {
                log::warn!("Skipping mask {}: {:#}", id, err);
                skipped.push(id);
            }
            Err(err) => {
                log::warn!("Skipping mask {}: decode task failed: {}", id, err);
                skipped.push(id);
            }
        }
    }

    log::debug!(
        "Loaded {}/{} masks for image {} (epoch {})",
        kept.len(),
        total,
        ticket.image_hash,
        ticket.epoch
    );

    LoadedBatch {
        ticket,
        masks: kept,
        index: MaskIndex::from_masks(width, height, indexed),
        skipped,
    }
}

/// Decode and index a single mask outside of a batch load
pub async fn load_single(
    mask: Mask,
    batch_index: usize,
    width: u32,
    height: u32,
    threshold: u8,
) -> Result<(Mask, IndexedMask)> {
    tokio::task::spawn_blocking(move || {
        let indexed = index_mask(&mask, batch_index, width, height, threshold)?;
        Ok((mask, indexed))
    })
    .await
    .context("Mask decode task failed")?
}

//! Mask records as produced by the segmentation service
//!
//! `MaskRecord` is the loosely shaped wire form (base64 payloads, optional
//! metadata). It is validated into a strict `Mask` at the boundary and never
//! passed further in.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::config::OverlayColor;

/// Identifier of a mask, unique within one batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskId(pub u32);

impl fmt::Display for MaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Automatic mask generation settings sent to the segmentation service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default = "default_points_per_side")]
    pub points_per_side: u32,
    #[serde(default = "default_pred_iou_thresh")]
    pub pred_iou_thresh: f32,
    #[serde(default = "default_stability_score_thresh")]
    pub stability_score_thresh: f32,
}

fn default_points_per_side() -> u32 {
    96
}

fn default_pred_iou_thresh() -> f32 {
    0.7
}

fn default_stability_score_thresh() -> f32 {
    0.8
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            points_per_side: default_points_per_side(),
            pred_iou_thresh: default_pred_iou_thresh(),
            stability_score_thresh: default_stability_score_thresh(),
        }
    }
}

/// A single candidate region over the session image
///
/// `bitmap` holds the encoded raster payload (PNG in practice). It is decoded
/// by the mask loader, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MaskRecord", into = "MaskRecord")]
pub struct Mask {
    pub id: MaskId,
    pub bitmap: Vec<u8>,
    pub score: Option<f32>,
    pub area: Option<f32>,
    /// Inclusive `[x1, y1, x2, y2]`
    pub bbox: Option<[f32; 4]>,
    pub stability_score: Option<f32>,
}

impl Mask {
    /// Create a mask with no metadata
    pub fn new(id: MaskId, bitmap: Vec<u8>) -> Self {
        Self {
            id,
            bitmap,
            score: None,
            area: None,
            bbox: None,
            stability_score: None,
        }
    }
}

/// Wire representation of a mask
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaskRecord {
    pub id: u32,
    /// Base64-encoded raster image
    #[serde(default)]
    pub mask: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability_score: Option<f32>,
}

impl TryFrom<MaskRecord> for Mask {
    type Error = anyhow::Error;

    fn try_from(record: MaskRecord) -> Result<Self> {
        let id = MaskId(record.id);
        if record.mask.trim().is_empty() {
            bail!("mask {id} has no bitmap payload");
        }
        let bitmap = STANDARD
            .decode(record.mask.trim())
            .with_context(|| format!("mask {id} has an invalid base64 payload"))?;

        let bbox = match record.bbox {
            None => None,
            Some(values) => {
                let bbox: [f32; 4] = values.as_slice().try_into().map_err(|_| {
                    anyhow::anyhow!("mask {id} bbox must have 4 values, got {}", values.len())
                })?;
                Some(bbox)
            }
        };

        Ok(Mask {
            id,
            bitmap,
            score: record.score,
            area: record.area,
            bbox,
            stability_score: record.stability_score,
        })
    }
}

impl From<Mask> for MaskRecord {
    fn from(mask: Mask) -> Self {
        Self {
            id: mask.id.0,
            mask: STANDARD.encode(&mask.bitmap),
            score: mask.score,
            bbox: mask.bbox.map(|b| b.to_vec()),
            area: mask.area,
            stability_score: mask.stability_score,
        }
    }
}

/// Response body of a batch generation call
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum BatchPayload {
    Bare(Vec<MaskRecord>),
    Wrapped { masks: Vec<MaskRecord> },
}

/// Parse a JSON mask batch, either a bare array or `{ "masks": [...] }`
pub fn parse_batch(json: &str) -> Result<Vec<Mask>> {
    let payload: BatchPayload = serde_json::from_str(json).context("malformed mask batch")?;
    let records = match payload {
        BatchPayload::Bare(records) => records,
        BatchPayload::Wrapped { masks } => masks,
    };
    let masks = records
        .into_iter()
        .map(Mask::try_from)
        .collect::<Result<Vec<_>>>()?;
    validate_batch(&masks)?;
    Ok(masks)
}

/// Reject batches with duplicate ids
pub fn validate_batch(masks: &[Mask]) -> Result<()> {
    let mut seen = HashSet::with_capacity(masks.len());
    for mask in masks {
        if !seen.insert(mask.id) {
            bail!("duplicate mask id {} in batch", mask.id);
        }
    }
    Ok(())
}

/// Where the pixels of a committed paint operation come from
#[derive(Debug, Clone)]
pub enum PaintSource {
    /// A mask of the current batch
    Mask(MaskId),
    /// A detached intensity plane, sized to the session image
    Inline {
        /// Id of the mask the paint was committed on
        origin: MaskId,
        plane: Arc<GrayImage>,
    },
}

/// A committed recolor of one region
#[derive(Debug, Clone)]
pub struct ColoredMask {
    pub source: PaintSource,
    pub color: OverlayColor,
    /// 0.0 - 1.0
    pub opacity: f32,
}

impl ColoredMask {
    /// The batch mask this layer follows, None once detached
    pub fn mask_id(&self) -> Option<MaskId> {
        match self.source {
            PaintSource::Mask(id) => Some(id),
            PaintSource::Inline { .. } => None,
        }
    }

    /// Id the paint was committed on, kept after detaching
    pub fn origin(&self) -> MaskId {
        match self.source {
            PaintSource::Mask(id) | PaintSource::Inline { origin: id, .. } => id,
        }
    }
}

/// Serde helper for raw bytes stored as base64 strings
pub(crate) mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

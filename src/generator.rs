//! Mask generation seam
//!
//! The segmentation service lives outside this crate. The engine only talks
//! to it through `MaskGenerator`; tests plug in fakes, the CLI plugs in
//! `FileGenerator` which serves a pre-computed batch from disk.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::domain::{GenerationParams, Mask, parse_batch};

/// Request for a full automatic segmentation of an image
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub image_hash: String,
    pub params: GenerationParams,
}

/// Request for a single mask around an image pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointRequest {
    pub image_hash: String,
    pub x: u32,
    pub y: u32,
}

/// A source of segmentation masks
pub trait MaskGenerator {
    /// Segment the whole image
    fn generate_all(&self, req: &GenerationRequest)
    -> impl Future<Output = Result<Vec<Mask>>> + Send;

    /// Produce one mask covering the object under the point
    ///
    /// The returned id is ignored; the engine assigns a fresh one.
    fn generate_at_point(&self, req: &PointRequest) -> impl Future<Output = Result<Mask>> + Send;
}

/// Serves a mask batch stored as JSON on disk
#[derive(Debug, Clone)]
pub struct FileGenerator {
    path: PathBuf,
}

impl FileGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MaskGenerator for FileGenerator {
    async fn generate_all(&self, req: &GenerationRequest) -> Result<Vec<Mask>> {
        log::info!(
            "Reading masks for {} from {}",
            req.image_hash,
            self.path.display()
        );
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read mask batch {}", self.path.display()))?;
        parse_batch(&json).with_context(|| format!("Invalid mask batch {}", self.path.display()))
    }

    async fn generate_at_point(&self, req: &PointRequest) -> Result<Mask> {
        bail!(
            "{} holds a fixed batch and cannot segment at ({}, {})",
            self.path.display(),
            req.x,
            req.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MaskId;

    fn request() -> GenerationRequest {
        GenerationRequest {
            image_hash: "abc".to_string(),
            params: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn test_file_generator_reads_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masks.json");
        std::fs::write(&path, r#"[{"id": 3, "mask": "AAEC"}]"#).unwrap();

        let generator = FileGenerator::new(&path);
        let masks = generator.generate_all(&request()).await.unwrap();
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].id, MaskId(3));
    }

    #[tokio::test]
    async fn test_file_generator_errors() {
        let dir = tempfile::tempdir().unwrap();
        let generator = FileGenerator::new(dir.path().join("missing.json"));
        assert!(generator.generate_all(&request()).await.is_err());

        let point = PointRequest {
            image_hash: "abc".to_string(),
            x: 1,
            y: 2,
        };
        assert!(generator.generate_at_point(&point).await.is_err());
    }
}

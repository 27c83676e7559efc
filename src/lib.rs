//! Interactive mask selection over segmentation output
//!
//! Maps pointer input onto a batch of AI-generated masks, resolves overlaps,
//! tracks hover and selection, composites colored overlays and caches mask
//! batches by image content.

pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod generator;
pub mod masks;
pub mod render;
pub mod session;

//! Mask and embedding cache
//!
//! This module contains:
//! - The `CacheStore` persistence seam with memory and JSON-file backends
//! - `CacheManager`, which adds hashing, TTL expiry and status reporting

pub mod manager;
pub mod store;

pub use manager::{CacheEntry, CacheManager, CacheStatus, EmbeddingEntry, image_hash};
pub use store::{CacheStore, JsonFileStore, MemoryStore};

//! Mask loading, indexing and hit-testing
//!
//! This module contains:
//! - Batch decoding with stale-load detection (loader.rs)
//! - Per-mask membership bitsets (index.rs)
//! - Smallest-area point resolution (hit.rs)

pub mod hit;
pub mod index;
pub mod loader;

pub use hit::HitTester;
pub use index::{IndexedMask, MaskIndex, PixelIndex};
pub use loader::{LoadTicket, LoadedBatch, load_batch, load_single};

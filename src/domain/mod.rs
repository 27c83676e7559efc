//! Pure domain types with minimal dependencies
//!
//! This module contains core types used throughout the engine.
//! Types here should not depend on rendering or async plumbing
//! to avoid circular dependencies.

pub mod geometry;
pub mod mask;
pub mod selection;

pub use geometry::*;
pub use mask::*;
pub use selection::*;

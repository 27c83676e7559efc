//! Overlay rendering module
//!
//! This module contains:
//! - Canvas/image coordinate mapping (geometry.rs)
//! - Layered overlay compositing using tiny-skia (compositor.rs)
//! - Pixmap conversion, paint baking and PNG export (image.rs)

pub mod compositor;
pub mod geometry;
pub mod image;

pub use compositor::{Compositor, Frame, OverlayStyle};
pub use geometry::Viewport;

//! Mask session management module
//!
//! This module contains:
//! - Session state (image, batch, selection, hover, paint)
//! - Pointer and command message types
//! - Message handlers implementing the selection state machine

pub mod handlers;
pub mod messages;
pub mod state;

pub use handlers::{handle_msg, handle_pointer};
pub use messages::{Msg, Outcome, PointerEvent, PointerKind};
pub use state::{LoadedImage, Session};

//! Message types for a mask session
//!
//! This module contains:
//! - PointerEvent for canvas pointer input
//! - Msg enum for toolbar-style commands
//! - Outcome returned by every handler

use crate::config::OverlayColor;
use crate::domain::{InteractionMode, MaskId, Modifiers, PointerButton};
use crate::generator::PointRequest;

// ============================================================================
// Pointer input
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Move,
    Press(PointerButton),
    /// Pointer left the canvas
    Leave,
}

/// Pointer input in canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub x: f32,
    pub y: f32,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn moved(x: f32, y: f32) -> Self {
        Self {
            kind: PointerKind::Move,
            x,
            y,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn press(x: f32, y: f32, button: PointerButton, modifiers: Modifiers) -> Self {
        Self {
            kind: PointerKind::Press(button),
            x,
            y,
            modifiers,
        }
    }

    /// Plain primary click
    pub fn click(x: f32, y: f32) -> Self {
        Self::press(x, y, PointerButton::Primary, Modifiers::NONE)
    }

    pub fn leave() -> Self {
        Self {
            kind: PointerKind::Leave,
            x: f32::NAN,
            y: f32::NAN,
            modifiers: Modifiers::NONE,
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone)]
pub enum Msg {
    /// Commit every selected mask as paint and clear the selection
    Paint { color: OverlayColor, opacity: f32 },
    /// Remove the paint committed on one mask id, even after a regeneration
    Unpaint(MaskId),
    ClearPaint,
    SelectAll,
    ClearSelection,
    SetShowAll(bool),
    SetMode(InteractionMode),
    /// Canvas resized to (width, height)
    Resize(f32, f32),
}

/// What the caller should do after a handler ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing visible changed
    NoOp,
    /// State changed, redraw
    Redraw,
    /// Ask the generator for a mask at this point
    Generate(PointRequest),
}

impl Outcome {
    pub(crate) fn redraw_if(changed: bool) -> Self {
        if changed { Outcome::Redraw } else { Outcome::NoOp }
    }
}

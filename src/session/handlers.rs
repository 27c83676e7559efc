//! Session message handlers
//!
//! Handles pointer events and `Msg` commands, mutating `Session` and
//! reporting an `Outcome` to the caller.

use crate::domain::{InteractionMode, MaskId, Modifiers, PointerButton};
use crate::generator::PointRequest;
use crate::masks::HitTester;
use crate::session::messages::{Msg, Outcome, PointerEvent, PointerKind};
use crate::session::state::Session;

/// Handle one pointer event
pub fn handle_pointer(session: &mut Session, event: PointerEvent) -> Outcome {
    match event.kind {
        PointerKind::Leave => Outcome::redraw_if(session.set_hover(None)),
        PointerKind::Move => handle_move(session, event.x, event.y),
        PointerKind::Press(button) => match session.mode {
            InteractionMode::Select => handle_select_press(session, event, button),
            InteractionMode::Generate => handle_generate_press(session, event, button),
        },
    }
}

/// Handle one command
pub fn handle_msg(session: &mut Session, msg: Msg) -> Outcome {
    match msg {
        Msg::Paint { color, opacity } => {
            Outcome::redraw_if(session.paint_selection(color, opacity) > 0)
        }
        Msg::Unpaint(id) => Outcome::redraw_if(session.unpaint(id)),
        Msg::ClearPaint => Outcome::redraw_if(session.clear_paint()),
        Msg::SelectAll => Outcome::redraw_if(session.select_all()),
        Msg::ClearSelection => Outcome::redraw_if(session.clear_selection()),
        Msg::SetShowAll(on) => {
            let changed = session.show_all != on;
            session.show_all = on;
            Outcome::redraw_if(changed)
        }
        Msg::SetMode(mode) => Outcome::redraw_if(session.set_mode(mode)),
        Msg::Resize(width, height) => {
            session.viewport.resize(width, height);
            Outcome::Redraw
        }
    }
}

// ============================================================================
// Pointer handlers
// ============================================================================

/// Mask under a canvas position, using hover sampling if configured
fn hit_at(session: &Session, x: f32, y: f32) -> Option<MaskId> {
    let point = session.viewport.to_image(x, y);
    HitTester::new(session.index()).query_point(point, session.hover_neighborhood)
}

fn handle_move(session: &mut Session, x: f32, y: f32) -> Outcome {
    if session.mode == InteractionMode::Generate {
        return Outcome::NoOp;
    }
    let hit = hit_at(session, x, y);
    Outcome::redraw_if(session.set_hover(hit))
}

fn handle_select_press(session: &mut Session, event: PointerEvent, button: PointerButton) -> Outcome {
    let hit = hit_at(session, event.x, event.y);
    let removing = button == PointerButton::Secondary || event.modifiers.remove;

    let changed = match (hit, removing) {
        (Some(id), true) => session.select_with(id, |s| {
            s.remove(id);
        }),
        (None, true) => false,
        (Some(id), false) => select_click(session, id, event.modifiers),
        (None, false) if event.modifiers.extend => false,
        (None, false) => session.clear_selection(),
    };
    Outcome::redraw_if(changed)
}

fn select_click(session: &mut Session, id: MaskId, modifiers: Modifiers) -> bool {
    if modifiers.extend {
        return session.select_with(id, |s| {
            s.toggle(id);
        });
    }
    session.select_with(id, |s| {
        if s.is_single(id) {
            s.clear();
        } else {
            s.replace(id);
        }
    })
}

fn handle_generate_press(session: &mut Session, event: PointerEvent, button: PointerButton) -> Outcome {
    if button != PointerButton::Primary {
        return Outcome::NoOp;
    }
    let point = session.viewport.to_image(event.x, event.y);
    match session.image_hash() {
        Some(hash) if point.in_bounds => Outcome::Generate(PointRequest {
            image_hash: hash.to_string(),
            x: point.x,
            y: point.y,
        }),
        _ => Outcome::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverlayColor;
    use crate::domain::{SelectionPhase, SelectionSet};
    use crate::session::state::tests::three_rects;

    fn ids(set: &SelectionSet) -> Vec<u32> {
        set.iter().map(|id| id.0).collect()
    }

    #[test]
    fn test_click_extend_remove_scenario() {
        let mut session = three_rects();

        assert_eq!(handle_pointer(&mut session, PointerEvent::click(50.0, 50.0)), Outcome::Redraw);
        assert_eq!(ids(session.selection()), vec![2]);

        let shift = PointerEvent::press(5.0, 5.0, PointerButton::Primary, Modifiers::extend());
        assert_eq!(handle_pointer(&mut session, shift), Outcome::Redraw);
        assert_eq!(ids(session.selection()), vec![1, 2]);

        let right = PointerEvent::press(50.0, 50.0, PointerButton::Secondary, Modifiers::NONE);
        assert_eq!(handle_pointer(&mut session, right), Outcome::Redraw);
        assert_eq!(ids(session.selection()), vec![1]);

        // Removing something unselected reports no change
        assert_eq!(handle_pointer(&mut session, right), Outcome::NoOp);
    }

    #[test]
    fn test_plain_click_toggles_single_selection() {
        let mut session = three_rects();
        handle_pointer(&mut session, PointerEvent::click(50.0, 50.0));
        handle_pointer(&mut session, PointerEvent::click(50.0, 50.0));
        assert!(session.selection().is_empty());
    }

    #[test]
    fn test_click_on_background() {
        let mut session = three_rects();
        handle_pointer(&mut session, PointerEvent::click(50.0, 50.0));

        let shift = PointerEvent::press(35.0, 35.0, PointerButton::Primary, Modifiers::extend());
        assert_eq!(handle_pointer(&mut session, shift), Outcome::NoOp);
        assert_eq!(ids(session.selection()), vec![2]);

        assert_eq!(handle_pointer(&mut session, PointerEvent::click(35.0, 35.0)), Outcome::Redraw);
        assert!(session.selection().is_empty());
    }

    #[test]
    fn test_extend_toggle_pair_is_identity() {
        let mut session = three_rects();
        handle_pointer(&mut session, PointerEvent::click(5.0, 5.0));
        let before = session.selection().clone();
        let shift = PointerEvent::press(85.0, 5.0, PointerButton::Primary, Modifiers::extend());
        handle_pointer(&mut session, shift);
        handle_pointer(&mut session, shift);
        assert_eq!(session.selection(), &before);
    }

    #[test]
    fn test_hover_and_leave() {
        let mut session = three_rects();
        assert_eq!(handle_pointer(&mut session, PointerEvent::moved(85.0, 10.0)), Outcome::Redraw);
        assert_eq!(session.hovered(), Some(MaskId(3)));
        assert_eq!(handle_pointer(&mut session, PointerEvent::moved(86.0, 11.0)), Outcome::NoOp);
        assert_eq!(handle_pointer(&mut session, PointerEvent::leave()), Outcome::Redraw);
        assert_eq!(session.phase(), SelectionPhase::Idle);
    }

    #[test]
    fn test_generate_mode_requests_point() {
        let mut session = three_rects();
        handle_msg(&mut session, Msg::SetMode(InteractionMode::Generate));
        assert_eq!(handle_pointer(&mut session, PointerEvent::moved(50.0, 50.0)), Outcome::NoOp);
        assert_eq!(session.hovered(), None);

        let outcome = handle_pointer(&mut session, PointerEvent::click(12.5, 80.9));
        assert_eq!(
            outcome,
            Outcome::Generate(PointRequest {
                image_hash: "img".to_string(),
                x: 12,
                y: 80,
            })
        );
        assert!(session.selection().is_empty());
    }

    #[test]
    fn test_messages() {
        let mut session = three_rects();
        assert_eq!(handle_msg(&mut session, Msg::SelectAll), Outcome::Redraw);
        assert_eq!(session.selection().len(), 3);
        let paint = Msg::Paint {
            color: OverlayColor::default(),
            opacity: 0.7,
        };
        assert_eq!(handle_msg(&mut session, paint.clone()), Outcome::Redraw);
        assert_eq!(session.painted().len(), 3);
        assert_eq!(handle_msg(&mut session, paint), Outcome::NoOp);
        assert_eq!(handle_msg(&mut session, Msg::Unpaint(MaskId(9))), Outcome::NoOp);
        assert_eq!(handle_msg(&mut session, Msg::SetShowAll(true)), Outcome::Redraw);
        assert_eq!(handle_msg(&mut session, Msg::SetShowAll(true)), Outcome::NoOp);
        assert_eq!(handle_msg(&mut session, Msg::ClearPaint), Outcome::Redraw);
        assert_eq!(handle_msg(&mut session, Msg::ClearSelection), Outcome::NoOp);
    }

    #[test]
    fn test_resize_remaps_pointer() {
        let mut session = three_rects();
        handle_msg(&mut session, Msg::Resize(200.0, 100.0));
        // Image now sits at x offset 50
        handle_pointer(&mut session, PointerEvent::click(100.0, 50.0));
        assert_eq!(ids(session.selection()), vec![2]);
        assert_eq!(handle_pointer(&mut session, PointerEvent::click(10.0, 50.0)), Outcome::Redraw);
        assert!(session.selection().is_empty());
    }
}

//! Pointer/touch input mapped to screen events

use crate::event::{EventKind, ScreenEvent, ScreenPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// Platform input, already decoded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Resize { width: i32, height: i32 },
    MouseMove { x: i32, y: i32, dx: i32, dy: i32, left_down: bool },
    MouseDown { x: i32, y: i32, button: MouseButton },
    MouseUp { x: i32, y: i32, button: MouseButton },
    MouseEnter,
    MouseExit,
    TouchMove { x: i32, y: i32, dx: i32, dy: i32 },
    TouchDown { x: i32, y: i32 },
    TouchUp { x: i32, y: i32 },
}

impl InputEvent {
    /// Screen event for the main canvas. Drags start at the previous
    /// position and carry the motion in `dx`/`dy`.
    pub fn to_screen_event(self) -> Option<EventKind> {
        let (ty, p) = match self {
            InputEvent::Resize { .. } => return None,
            InputEvent::MouseMove { x, y, dx, dy, left_down: true } => {
                (ScreenEvent::PressDrag, ScreenPoint::with_delta(x - dx, y - dy, dx, dy))
            }
            InputEvent::MouseMove { x, y, dx, dy, left_down: false } => {
                (ScreenEvent::Hover, ScreenPoint::with_delta(x, y, dx, dy))
            }
            InputEvent::MouseDown { x, y, button: MouseButton::Left } => {
                (ScreenEvent::PressDown, ScreenPoint::at(x, y))
            }
            InputEvent::MouseUp { x, y, button: MouseButton::Left } => {
                (ScreenEvent::PressUp, ScreenPoint::at(x, y))
            }
            InputEvent::MouseDown { .. } | InputEvent::MouseUp { .. } => return None,
            InputEvent::MouseEnter => (ScreenEvent::HoverEnter, ScreenPoint::default()),
            InputEvent::MouseExit => (ScreenEvent::HoverExit, ScreenPoint::default()),
            InputEvent::TouchMove { x, y, dx, dy } => {
                (ScreenEvent::PressDrag, ScreenPoint::with_delta(x - dx, y - dy, dx, dy))
            }
            InputEvent::TouchDown { x, y } => (ScreenEvent::PressDown, ScreenPoint::at(x, y)),
            InputEvent::TouchUp { x, y } => (ScreenEvent::PressUp, ScreenPoint::at(x, y)),
        };
        Some(EventKind::Screen(ty, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drag_starts_at_previous_position() {
        let e = InputEvent::MouseMove { x: 50, y: 40, dx: 5, dy: -2, left_down: true };
        assert_eq!(
            e.to_screen_event(),
            Some(EventKind::Screen(ScreenEvent::PressDrag, ScreenPoint::with_delta(45, 42, 5, -2)))
        );
        let t = InputEvent::TouchMove { x: 50, y: 40, dx: 5, dy: -2 };
        assert_eq!(t.to_screen_event(), e.to_screen_event());
    }

    #[test]
    fn test_only_left_button_presses() {
        let down = InputEvent::MouseDown { x: 1, y: 2, button: MouseButton::Left };
        assert_eq!(
            down.to_screen_event(),
            Some(EventKind::Screen(ScreenEvent::PressDown, ScreenPoint::at(1, 2)))
        );
        let right = InputEvent::MouseUp { x: 1, y: 2, button: MouseButton::Right };
        assert_eq!(right.to_screen_event(), None);
        assert_eq!(InputEvent::Resize { width: 1, height: 1 }.to_screen_event(), None);
    }
}

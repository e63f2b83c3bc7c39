//! Block capabilities
//!
//! A block is any value that takes part in dispatch. Capabilities are
//! composed rather than inherited:
//! - `Eventable`: owns an `EventCore` (id, queue handle, enabled flag) and
//!   receives events and actions
//! - `Drawable`: owns a `DrawState` (size, visibility)
//! - `FrameProcessor`: advanced once per frame by the manager
//!
//! An eventable block that is also drawable says so through
//! `as_drawable`/`as_drawable_mut`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::event::{BlockAction, BlockEvent, EventKind};
use crate::id::Id;
use crate::queue::EventSender;

pub type BlockRef = Rc<RefCell<dyn Eventable>>;
pub type WeakBlockRef = Weak<RefCell<dyn Eventable>>;

/// Registration state shared by every eventable block
#[derive(Debug, Clone)]
pub struct EventCore {
    id: Id,
    sender: Option<EventSender>,
    enabled: bool,
}

impl Default for EventCore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCore {
    pub fn new() -> Self {
        Self {
            id: Id::NULL,
            sender: None,
            enabled: true,
        }
    }

    /// Id assigned by the manager, `Id::NULL` while unregistered
    #[inline]
    pub fn connection_id(&self) -> Id {
        self.id
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        !self.id.is_null() && self.sender.is_some()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn toggle_enabled(&mut self) {
        self.enabled = !self.enabled;
    }

    /// Queue an event from this block. Ignored while unregistered.
    pub fn send_event(&self, kind: EventKind) -> bool {
        self.send_custom_origin_event(kind, self.id)
    }

    /// Queue an event stamped with someone else's id
    pub fn send_custom_origin_event(&self, kind: EventKind, origin: Id) -> bool {
        match &self.sender {
            Some(sender) if !self.id.is_null() => sender.send(origin, kind),
            _ => false,
        }
    }

    pub(crate) fn attach(&mut self, id: Id, sender: EventSender) {
        self.id = id;
        self.sender = Some(sender);
    }

    pub(crate) fn detach(&mut self) {
        self.id = Id::NULL;
        self.sender = None;
    }
}

/// Participates in event dispatch
pub trait Eventable {
    fn core(&self) -> &EventCore;
    fn core_mut(&mut self) -> &mut EventCore;

    /// Screen-level event, already translated to block-local coordinates
    fn event(&mut self, _e: &BlockEvent) {}

    /// Command routed through a connection
    fn action(&mut self, _a: &BlockAction) {}

    fn as_drawable(&self) -> Option<&dyn Drawable> {
        None
    }

    fn as_drawable_mut(&mut self) -> Option<&mut dyn Drawable> {
        None
    }

    /// Size of the hit-test region; `None` means the block ignores pointer input
    fn event_region(&self) -> Option<(i32, i32)> {
        self.as_drawable().map(|d| (d.width(), d.height()))
    }

    fn connection_id(&self) -> Id {
        self.core().connection_id()
    }

    fn send_event(&self, kind: EventKind) -> bool {
        self.core().send_event(kind)
    }
}

/// Size and visibility of something that can be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawState {
    pub width: i32,
    pub height: i32,
    pub visible: bool,
}

impl DrawState {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            visible: true,
        }
    }
}

pub trait Drawable {
    fn draw_state(&self) -> &DrawState;
    fn draw_state_mut(&mut self) -> &mut DrawState;

    fn width(&self) -> i32 {
        self.draw_state().width
    }

    fn height(&self) -> i32 {
        self.draw_state().height
    }

    fn is_visible(&self) -> bool {
        self.draw_state().visible
    }

    fn show(&mut self) {
        self.draw_state_mut().visible = true;
    }

    fn hide(&mut self) {
        self.draw_state_mut().visible = false;
    }

    fn toggle_visible(&mut self) {
        let s = self.draw_state_mut();
        s.visible = !s.visible;
    }
}

/// Advanced once per frame, after queued events are processed
pub trait FrameProcessor {
    fn frame(&mut self, delta_ms: f64);
}

/// Recording block shared by the unit tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Default)]
    pub struct Recorder {
        pub core: EventCore,
        pub draw: Option<DrawState>,
        pub events: Vec<BlockEvent>,
        pub actions: Vec<BlockAction>,
    }

    impl Recorder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn drawable(width: i32, height: i32) -> Self {
            Self {
                draw: Some(DrawState::new(width, height)),
                ..Self::default()
            }
        }

        pub fn shared(self) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(self))
        }
    }

    impl Eventable for Recorder {
        fn core(&self) -> &EventCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut EventCore {
            &mut self.core
        }

        fn event(&mut self, e: &BlockEvent) {
            self.events.push(*e);
        }

        fn action(&mut self, a: &BlockAction) {
            self.actions.push(*a);
        }

        fn as_drawable(&self) -> Option<&dyn Drawable> {
            self.draw.as_ref().map(|_| self as &dyn Drawable)
        }

        fn as_drawable_mut(&mut self) -> Option<&mut dyn Drawable> {
            if self.draw.is_some() {
                Some(self as &mut dyn Drawable)
            } else {
                None
            }
        }
    }

    impl Drawable for Recorder {
        fn draw_state(&self) -> &DrawState {
            const HIDDEN: DrawState = DrawState {
                width: 0,
                height: 0,
                visible: false,
            };
            self.draw.as_ref().unwrap_or(&HIDDEN)
        }

        fn draw_state_mut(&mut self) -> &mut DrawState {
            self.draw.get_or_insert(DrawState::new(0, 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ScreenEvent, ScreenPoint};
    use crate::queue::EventQueue;

    #[test]
    fn test_unregistered_sends_are_ignored() {
        let core = EventCore::new();
        assert!(!core.is_registered());
        assert!(!core.send_event(EventKind::Screen(ScreenEvent::PressDown, ScreenPoint::at(0, 0))));
    }

    #[test]
    fn test_attached_core_stamps_its_id() {
        let queue = Rc::new(RefCell::new(EventQueue::new(4)));
        let mut core = EventCore::new();
        core.attach(Id(5), EventSender::new(queue.clone()));
        assert!(core.send_event(EventKind::collided_with(Id(2))));
        assert!(core.send_custom_origin_event(EventKind::collided_with(Id(2)), Id(8)));

        let mut q = queue.borrow_mut();
        assert_eq!(q.recv().map(|e| e.origin), Some(Id(5)));
        assert_eq!(q.recv().map(|e| e.origin), Some(Id(8)));

        drop(q);
        core.detach();
        assert!(!core.send_event(EventKind::collided_with(Id(2))));
    }

    #[test]
    fn test_enable_toggles() {
        let mut core = EventCore::new();
        assert!(core.is_enabled());
        core.toggle_enabled();
        assert!(!core.is_enabled());
        core.enable();
        assert!(core.is_enabled());
    }

    #[test]
    fn test_drawable_visibility() {
        let mut r = testing::Recorder::drawable(10, 4);
        let d = r.as_drawable_mut().unwrap();
        d.hide();
        assert!(!d.is_visible());
        d.toggle_visible();
        assert!(d.is_visible());
        assert_eq!(r.event_region(), Some((10, 4)));
        assert_eq!(testing::Recorder::new().event_region(), None);
    }
}
